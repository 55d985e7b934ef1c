use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use rand::Rng;

use skirmish::DEFAULT_PORT;
use skirmish_client::{ClientConfig, InputState, NetworkClient};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pattern {
    /// Stand still.
    Idle,
    /// Walk in a circle, aiming along the path.
    Circle,
    /// Strafe left and right while aiming up.
    Strafe,
    /// Pick a new random direction every second.
    Wander,
}

#[derive(Parser)]
#[command(name = "client")]
#[command(about = "Headless skirmish bot client")]
struct Args {
    #[arg(short, long, default_value_t = format!("127.0.0.1:{}", DEFAULT_PORT))]
    server: String,

    #[arg(short, long, value_enum, default_value_t = Pattern::Circle)]
    pattern: Pattern,

    #[arg(short, long, help = "Seconds to stay connected (runs forever if omitted)")]
    duration: Option<u64>,

    #[arg(long, default_value_t = 2, help = "Remote interpolation delay in ticks")]
    interpolation_delay: u32,
}

struct Bot {
    pattern: Pattern,
    started: Instant,
    wander: [f32; 2],
    next_wander: Instant,
}

impl Bot {
    fn new(pattern: Pattern) -> Self {
        let now = Instant::now();
        Self {
            pattern,
            started: now,
            wander: [0.0, 0.0],
            next_wander: now,
        }
    }

    fn sample(&mut self) -> InputState {
        let t = self.started.elapsed().as_secs_f32();
        match self.pattern {
            Pattern::Idle => InputState::default(),
            Pattern::Circle => {
                let direction = [t.cos(), t.sin()];
                InputState {
                    move_direction: direction,
                    aim_direction: direction,
                    ..Default::default()
                }
            }
            Pattern::Strafe => InputState {
                move_direction: [(t * 2.0).sin().signum(), 0.0],
                aim_direction: [0.0, 1.0],
                fire: (t * 4.0).sin() > 0.0,
                ..Default::default()
            },
            Pattern::Wander => {
                if Instant::now() >= self.next_wander {
                    let angle = rand::thread_rng().gen_range(0.0..std::f32::consts::TAU);
                    self.wander = [angle.cos(), angle.sin()];
                    self.next_wander = Instant::now() + Duration::from_secs(1);
                }
                InputState {
                    move_direction: self.wander,
                    aim_direction: self.wander,
                    dash: rand::thread_rng().gen_bool(0.02),
                    ..Default::default()
                }
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let server_addr: SocketAddr = args.server.parse()?;

    let mut config = ClientConfig::default();
    config.interpolation.delay_ticks = args.interpolation_delay;

    let mut client = NetworkClient::new(config)?;
    client.connect(server_addr)?;
    let running = client.running();

    let mut bot = Bot::new(args.pattern);
    let deadline = args.duration.map(|secs| Instant::now() + Duration::from_secs(secs));
    let mut last_frame = Instant::now();
    let mut last_report = Instant::now();
    let mut was_connected = false;

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        let delta = now.duration_since(last_frame).as_secs_f32();
        last_frame = now;

        let input = bot.sample();
        client.update(delta, &input)?;

        if client.is_connected() {
            was_connected = true;
        } else if was_connected || client.denied_reason().is_some() {
            log::info!("Connection closed");
            break;
        } else if client.state() == skirmish::ConnectionState::Disconnected {
            anyhow::bail!("Could not connect to {}", server_addr);
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            report(&client);
            last_report = Instant::now();
        }

        if deadline.is_some_and(|d| now >= d) {
            log::info!("Duration elapsed, disconnecting");
            client.shutdown();
            break;
        }

        thread::sleep(Duration::from_millis(1));
    }

    report(&client);
    Ok(())
}

fn report(client: &NetworkClient) {
    let net = client.stats();
    let Some(session) = client.session() else {
        log::info!(
            "sent {} recv {} dropped {}",
            net.packets_sent,
            net.packets_received,
            net.packets_dropped
        );
        return;
    };

    let reconcile = session.reconcile_stats();
    let position = session.predicted_state().position;
    log::info!(
        "entity {} at ({:.2}, {:.2}) | pending {} | accepted {} corrected {} replayed {} max err {:.4} | remotes {} | rtt {:.1} ms",
        session.entity_id(),
        position.x,
        position.y,
        session.predictor().pending_len(),
        reconcile.accepted,
        reconcile.corrected,
        reconcile.replayed_inputs,
        reconcile.max_error,
        session.interpolator().entity_count(),
        net.rtt_ms
    );
}
