use crate::feedback::Renderer;
use crate::state::Simulation;
use crate::status::StatusEvent;
use std::time::Duration;
use tokio::sync::mpsc;

/// Seconds between status log lines
const STATUS_LOG_INTERVAL: f64 = 1.0;

/// User actions forwarded to the sim loop
#[derive(Debug, Clone, PartialEq)]
pub enum SimCommand {
    AddBall,
    ClearAll,
    Release,
    Play,
    Stop,
    ToggleFaderControl,
    ToggleAttraction,
    DragRing { ring: usize, x: f64, z: f64 },
}

impl SimCommand {
    /// Map a keyboard key to its command.
    pub fn from_key(key: char) -> Option<SimCommand> {
        match key.to_ascii_lowercase() {
            'a' => Some(SimCommand::AddBall),
            'c' => Some(SimCommand::ClearAll),
            'r' => Some(SimCommand::Release),
            'p' => Some(SimCommand::Play),
            's' => Some(SimCommand::Stop),
            'f' => Some(SimCommand::ToggleFaderControl),
            't' => Some(SimCommand::ToggleAttraction),
            _ => None,
        }
    }

    /// Parse one console line: a single key, or `drag <ring> <x> <z>`.
    pub fn parse_line(line: &str) -> Option<SimCommand> {
        let mut words = line.split_whitespace();
        let first = words.next()?;
        if first.eq_ignore_ascii_case("drag") {
            let ring = words.next()?.parse().ok()?;
            let x = words.next()?.parse().ok()?;
            let z = words.next()?.parse().ok()?;
            return Some(SimCommand::DragRing { ring, x, z });
        }
        let mut chars = first.chars();
        let key = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        SimCommand::from_key(key)
    }
}

/// Apply one user command to the simulation.
pub fn apply_command(sim: &mut Simulation, cmd: SimCommand) {
    match cmd {
        SimCommand::AddBall => {
            sim.add_ball();
        }
        SimCommand::ClearAll => sim.clear_all(),
        SimCommand::Release => {
            sim.release();
        }
        SimCommand::Play => sim.play(),
        SimCommand::Stop => sim.stop(),
        SimCommand::ToggleFaderControl => {
            sim.toggle_fader_control();
        }
        SimCommand::ToggleAttraction => {
            sim.toggle_attraction();
        }
        SimCommand::DragRing { ring, x, z } => {
            if !sim.drag_ring(ring, x, z) {
                tracing::warn!("No ring {} to drag", ring);
            }
        }
    }
}

/// Run the fixed-step sim loop. Owns the simulation until every sender
/// of commands and status events is gone.
pub async fn run_sim_loop(
    mut cmd_rx: mpsc::Receiver<SimCommand>,
    mut status_rx: mpsc::Receiver<StatusEvent>,
    mut sim: Simulation,
    mut renderer: Box<dyn Renderer + Send>,
) -> Simulation {
    let dt = sim.config().physics.dt;
    let log_every = ((STATUS_LOG_INTERVAL / dt).round() as u64).max(1);

    let mut tick_interval = tokio::time::interval(Duration::from_secs_f64(dt));
    tick_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    sim.send_initial_state();
    let mut commands_open = true;
    let mut status_open = true;

    loop {
        tokio::select! {
            _ = tick_interval.tick() => {
                sim.tick(renderer.as_mut());
                if sim.tick_count() % log_every == 0 {
                    tracing::info!("{}", sim.status_line());
                }
            }

            cmd = cmd_rx.recv(), if commands_open => {
                match cmd {
                    Some(cmd) => apply_command(&mut sim, cmd),
                    None => commands_open = false,
                }
            }

            event = status_rx.recv(), if status_open => {
                match event {
                    Some(event) => sim.handle_status_event(event),
                    None => status_open = false,
                }
            }
        }

        if !commands_open && !status_open {
            break;
        }
    }

    tracing::info!("Sim loop ended");
    sim
}
