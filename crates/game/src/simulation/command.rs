use std::collections::HashMap;

use bitflags::bitflags;
use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::step::AIM_EPSILON;
use crate::net::InputMessage;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct Buttons: u16 {
        const FIRE = 1 << 0;
        const ALT_FIRE = 1 << 1;
        const INTERACT = 1 << 2;
        const RELOAD = 1 << 3;
        const DASH = 1 << 4;
    }
}

/// One tick worth of player intent. Never mutated after construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputCommand {
    pub seq: u32,
    pub movement: Vec2,
    pub aim: Vec2,
    pub buttons: Buttons,
}

impl InputCommand {
    pub fn new(seq: u32, movement: Vec2, aim: Vec2, buttons: Buttons) -> Self {
        let aim = if aim.length() > AIM_EPSILON {
            aim.normalize()
        } else {
            Vec2::ZERO
        };

        Self {
            seq,
            movement: movement.clamp_length_max(1.0),
            aim,
            buttons,
        }
    }

    /// Zero movement, no aim. Used for ticks where a connection sent nothing new.
    pub fn neutral() -> Self {
        Self {
            seq: 0,
            movement: Vec2::ZERO,
            aim: Vec2::ZERO,
            buttons: Buttons::empty(),
        }
    }

    pub fn to_message(&self) -> InputMessage {
        InputMessage {
            sequence: self.seq,
            movement: self.movement.to_array(),
            aim: self.aim.to_array(),
            buttons: self.buttons.bits(),
        }
    }

    /// Rebuilds the command bit-for-bit as the client issued it. Clamping is
    /// left to `step` so both sides feed it the same values.
    pub fn from_message(message: &InputMessage) -> Self {
        Self {
            seq: message.sequence,
            movement: finite_or_zero(Vec2::from_array(message.movement)),
            aim: finite_or_zero(Vec2::from_array(message.aim)),
            buttons: Buttons::from_bits_truncate(message.buttons),
        }
    }
}

fn finite_or_zero(v: Vec2) -> Vec2 {
    if v.is_finite() { v } else { Vec2::ZERO }
}

/// Latest-wins input slot for a single connection.
#[derive(Debug, Default)]
pub struct InputSlot {
    last_acked: u32,
    pending: Option<InputCommand>,
}

impl InputSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` when the command is stale, duplicated, or older than
    /// the one already waiting.
    pub fn offer(&mut self, command: InputCommand) -> bool {
        if command.seq <= self.last_acked {
            return false;
        }
        if self
            .pending
            .as_ref()
            .is_some_and(|pending| command.seq <= pending.seq)
        {
            return false;
        }
        self.pending = Some(command);
        true
    }

    pub fn take(&mut self) -> Option<InputCommand> {
        let command = self.pending.take()?;
        self.last_acked = command.seq;
        Some(command)
    }

    pub fn last_acked(&self) -> u32 {
        self.last_acked
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }
}

/// Per-connection input slots, keyed by the owning entity id.
#[derive(Debug, Default)]
pub struct CommandBuffer {
    slots: HashMap<u32, InputSlot>,
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, entity_id: u32) {
        self.slots.entry(entity_id).or_default();
    }

    pub fn remove(&mut self, entity_id: u32) -> bool {
        self.slots.remove(&entity_id).is_some()
    }

    pub fn contains(&self, entity_id: u32) -> bool {
        self.slots.contains_key(&entity_id)
    }

    /// Unknown ids and stale sequences are rejected without side effects.
    pub fn push(&mut self, entity_id: u32, command: InputCommand) -> bool {
        self.slots
            .get_mut(&entity_id)
            .is_some_and(|slot| slot.offer(command))
    }

    pub fn take(&mut self, entity_id: u32) -> Option<InputCommand> {
        self.slots.get_mut(&entity_id).and_then(InputSlot::take)
    }

    pub fn last_acked(&self, entity_id: u32) -> Option<u32> {
        self.slots.get(&entity_id).map(InputSlot::last_acked)
    }

    pub fn acks(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        self.slots
            .iter()
            .map(|(&entity_id, slot)| (entity_id, slot.last_acked()))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
