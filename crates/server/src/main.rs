mod config;
mod events;
mod server;
mod tui;

use std::io;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{self, EnterAlternateScreen, LeaveAlternateScreen};
use crossterm::{cursor, execute};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;

use config::ServerConfig;
use events::ServerEvent;
use server::GameServer;
use skirmish::PacketLossSimulation;
use tui::{ClientInfo, TuiState};

#[derive(Parser)]
#[command(name = "skirmish-server")]
#[command(about = "Authoritative skirmish server")]
struct Args {
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    #[arg(short, long, default_value_t = skirmish::DEFAULT_PORT)]
    port: u16,

    #[arg(short, long, default_value_t = skirmish::DEFAULT_TICK_RATE)]
    tick_rate: u32,

    #[arg(short, long, default_value_t = 16)]
    max_clients: usize,

    #[arg(long, default_value_t = 2, help = "Server-driven drones to spawn")]
    drones: usize,

    #[arg(long, default_value_t = 10, help = "Seconds of silence before a client is dropped")]
    timeout: u64,

    #[arg(long)]
    headless: bool,

    #[arg(long, help = "Enable global packet loss simulation")]
    simulate_packet_loss: bool,

    #[arg(long, default_value_t = 0.0, help = "Packet loss percentage (0-100)")]
    loss_percent: f32,

    #[arg(long, default_value_t = 0, help = "Minimum latency in ms")]
    min_latency: u32,

    #[arg(long, default_value_t = 0, help = "Maximum latency in ms")]
    max_latency: u32,

    #[arg(long, default_value_t = 0, help = "Jitter in ms")]
    jitter: u32,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let bind_addr = format!("{}:{}", args.bind, args.port);

    let global_packet_loss = args.simulate_packet_loss.then(|| PacketLossSimulation {
        enabled: true,
        loss_percent: args.loss_percent,
        min_latency_ms: args.min_latency,
        max_latency_ms: args.max_latency,
        jitter_ms: args.jitter,
    });

    let config = ServerConfig {
        tick_rate: args.tick_rate,
        max_clients: args.max_clients,
        connection_timeout_secs: args.timeout,
        drone_count: args.drones,
        global_packet_loss,
    };

    if args.headless {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    }

    let mut server = GameServer::new(&bind_addr, config)?;

    if args.headless {
        log::info!(
            "Server started on {} at {} Hz",
            server.local_addr(),
            server.config().tick_rate
        );
        server.run();
        log::info!("Server shutting down");
    } else {
        run_with_tui(&mut server)?;
    }

    Ok(())
}

/// Preset applied by the `l` key to the selected client.
fn lossy_link() -> PacketLossSimulation {
    PacketLossSimulation {
        enabled: true,
        loss_percent: 5.0,
        min_latency_ms: 40,
        max_latency_ms: 80,
        jitter_ms: 10,
    }
}

fn toggle_link(server: &mut GameServer, state: &TuiState, clients: &[ClientInfo]) {
    let Some(index) = state.selected(clients.len()) else {
        return;
    };
    let client = &clients[index];
    let sim = if client.packet_loss_sim.enabled {
        PacketLossSimulation::default()
    } else {
        lossy_link()
    };
    server.set_packet_loss_sim(client.entity_id, sim);
}

fn run_with_tui(server: &mut GameServer) -> io::Result<()> {
    terminal::enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, cursor::Hide)?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let running = server.running();
    let mut tui_state = TuiState::new();

    tui_state.log_info(format!(
        "Server started on {} at {} Hz",
        server.local_addr(),
        server.config().tick_rate
    ));

    while running.load(Ordering::SeqCst) {
        server.tick_once();

        for event in server.drain_events() {
            match event {
                ServerEvent::ClientConnecting { addr } => {
                    tui_state.log_info(format!("Connection request from {}", addr));
                }
                ServerEvent::ClientConnected { entity_id, addr } => {
                    tui_state.log_info(format!("Entity {} connected from {}", entity_id, addr));
                }
                ServerEvent::ClientDisconnected { entity_id, reason } => {
                    tui_state.log_info(format!("Entity {} {}", entity_id, reason.as_str()));
                }
                ServerEvent::ConnectionDenied { addr, reason } => {
                    tui_state.log_warn(format!("Connection denied to {}: {}", addr, reason));
                }
                ServerEvent::Error { message } => {
                    tui_state.log_error(message);
                }
            }
        }

        if let Some(entity_id) = tui_state.take_pending_kick() {
            server.kick_client(entity_id);
        }

        if event::poll(Duration::from_millis(1))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    let clients = server.client_infos();

                    match key.code {
                        KeyCode::Char('q') | KeyCode::Esc => {
                            running.store(false, Ordering::SeqCst);
                        }
                        KeyCode::Up => tui_state.select_prev(clients.len()),
                        KeyCode::Down => tui_state.select_next(clients.len()),
                        KeyCode::Char('k') | KeyCode::Char('K') => {
                            tui_state.request_kick(&clients);
                        }
                        KeyCode::Char('l') | KeyCode::Char('L') => {
                            toggle_link(server, &tui_state, &clients);
                        }
                        _ => {}
                    }
                }
            }
        }

        let stats = server.stats();
        let clients = server.client_infos();
        terminal.draw(|frame| {
            tui::render(frame, &tui_state, &stats, &clients);
        })?;
    }

    tui_state.log_info("Shutting down...");
    server.shutdown_connections();

    terminal::disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, cursor::Show)?;

    Ok(())
}
