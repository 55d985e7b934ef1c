use glam::Vec2;

use skirmish::{Buttons, InputCommand};

/// Raw controls sampled once per local tick.
#[derive(Debug, Clone, Copy, Default)]
pub struct InputState {
    pub move_direction: [f32; 2],
    pub aim_direction: [f32; 2],
    pub fire: bool,
    pub alt_fire: bool,
    pub interact: bool,
    pub reload: bool,
    pub dash: bool,
}

impl InputState {
    pub fn buttons(&self) -> Buttons {
        let mut buttons = Buttons::empty();
        buttons.set(Buttons::FIRE, self.fire);
        buttons.set(Buttons::ALT_FIRE, self.alt_fire);
        buttons.set(Buttons::INTERACT, self.interact);
        buttons.set(Buttons::RELOAD, self.reload);
        buttons.set(Buttons::DASH, self.dash);
        buttons
    }

    pub fn to_command(&self, sequence: u32) -> InputCommand {
        InputCommand::new(
            sequence,
            Vec2::from_array(self.move_direction),
            Vec2::from_array(self.aim_direction),
            self.buttons(),
        )
    }
}
