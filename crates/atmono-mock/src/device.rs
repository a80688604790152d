//! Simulated monochromator controller.
//!
//! [`MockDevice`] owns the controller state and implements the command
//! handlers with the same admission order as the hardware:
//!
//! 1. status must be READY, otherwise `#RJCT`
//! 2. the controller must not be busy, otherwise `#BUSY`
//! 3. the argument must parse, otherwise `#RJCT`
//! 4. the value must be in range, otherwise `#OUR`
//! 5. the move is simulated (actuation delay), committed, and `#OK` returned
//!
//! Validation completes before the actuation delay starts, and fields are only
//! assigned after the delay, so queries during a move see the last committed
//! value. `!RST` is only gated by the busy flag.
//!
//! Handlers take `&self`; state lives behind a mutex that is never held across
//! an await point, so a second request can observe the busy flag while a move
//! is in progress.

#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};

use atmono_protocol::{CommandVerb, DeviceStatus, Query, QueryReply, Reply, Request, Response};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::SimulationConfig;

// ============================================================================
// Device state
// ============================================================================

/// Snapshot of the simulated controller state.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceState {
    /// Software status.
    pub status: DeviceStatus,
    /// Whether a state-changing command is being simulated.
    pub busy: bool,
    /// Current wavelength (nm), offset already applied.
    pub wavelength: f64,
    /// Wavelength calibration offset (nm).
    pub wavelength_offset: f64,
    /// Selected grating index.
    pub grating: i32,
    /// Entrance slit width (mm).
    pub entrance_slit_position: f64,
    /// Exit slit width (mm).
    pub exit_slit_position: f64,
}

/// A validated move, ready to be committed after the actuation delay.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Target {
    Wavelength(f64),
    Grating(i32),
    EntranceSlit(f64),
    ExitSlit(f64),
}

fn in_range(value: f64, (min, max): (f64, f64)) -> bool {
    min <= value && value <= max
}

/// Holds the busy flag for one state-changing command.
///
/// Dropping the guard clears the flag, so a handler that panics or is
/// cancelled mid-move cannot leave the controller BUSY.
struct BusyGuard<'a> {
    state: &'a Mutex<DeviceState>,
    /// Status to put back if the handler ends early while still SETTING_UP.
    restore: Option<DeviceStatus>,
}

impl<'a> BusyGuard<'a> {
    /// Take ownership of a busy flag just set under the state lock.
    fn hold(state: &'a Mutex<DeviceState>, restore: Option<DeviceStatus>) -> Self {
        BusyGuard { state, restore }
    }

    /// The handler completed normally.
    fn finish(mut self) {
        self.restore = None;
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        state.busy = false;
        if let Some(status) = self.restore.take() {
            if state.status == DeviceStatus::SettingUp {
                warn!(%status, "Command did not finish, restoring status");
                state.status = status;
            }
        }
    }
}

// ============================================================================
// Mock device
// ============================================================================

/// Simulated monochromator controller.
#[derive(Debug)]
pub struct MockDevice {
    config: SimulationConfig,
    home_grating: i32,
    state: Mutex<DeviceState>,
    #[cfg(test)]
    panic_next_move: AtomicBool,
}

impl MockDevice {
    /// Create a new device in the OFFLINE state at its home position.
    pub fn new(config: SimulationConfig) -> Self {
        let home_grating = config.grating_options.first().copied().unwrap_or_default();
        let state = DeviceState {
            status: DeviceStatus::Offline,
            busy: false,
            wavelength: config.min_wavelength,
            wavelength_offset: 0.0,
            grating: home_grating,
            entrance_slit_position: config.min_slit_width,
            exit_slit_position: config.min_slit_width,
        };

        MockDevice {
            config,
            home_grating,
            state: Mutex::new(state),
            #[cfg(test)]
            panic_next_move: AtomicBool::new(false),
        }
    }

    /// Get the configuration.
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Get a snapshot of the current state.
    pub fn state(&self) -> DeviceState {
        self.state.lock().clone()
    }

    /// Get the current status.
    pub fn status(&self) -> DeviceStatus {
        self.state.lock().status
    }

    /// Overwrite the status.
    ///
    /// Simulation hook for conditions the mock cannot reach on its own, such
    /// as a controller FAULT.
    pub fn force_status(&self, status: DeviceStatus) {
        let mut state = self.state.lock();
        info!(from = %state.status, to = %status, "Forcing controller status");
        state.status = status;
    }

    /// Make the next positional move panic after it has marked the
    /// controller busy.
    #[cfg(test)]
    pub(crate) fn panic_on_next_move(&self) {
        self.panic_next_move.store(true, Ordering::SeqCst);
    }

    /// A client connected: the controller sets up and becomes READY.
    pub fn client_connected(&self) {
        let mut state = self.state.lock();
        state.status = DeviceStatus::SettingUp;
        debug!("Controller setting up");
        state.status = DeviceStatus::Ready;
        info!("Controller ready");
    }

    /// The client went away: the controller goes OFFLINE.
    pub fn client_disconnected(&self) {
        self.state.lock().status = DeviceStatus::Offline;
        info!("Controller offline");
    }

    /// Decode and handle one received line.
    pub async fn handle_line(&self, line: &str) -> Response {
        let request = Request::parse(line);
        debug!(?request, "Handling request");
        let response = self.handle(request).await;
        debug!(reply = %response.to_line(), "Request handled");
        response
    }

    /// Handle one decoded request.
    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::Query(query) => Response::Query(self.query(query)),
            Request::Command { verb, args } => {
                let reply = match verb {
                    CommandVerb::Wavelength
                    | CommandVerb::Grating
                    | CommandVerb::EntranceSlit
                    | CommandVerb::ExitSlit => self.move_to(verb, &args).await,
                    CommandVerb::CalibrateWavelength => self.calibrate_wavelength(&args),
                    CommandVerb::Reset => self.reset(&args).await,
                    CommandVerb::SetAll => self.set_all(&args).await,
                };
                Response::Command(reply)
            }
            Request::Unknown(_) => Response::Command(Reply::Invalid),
        }
    }

    /// Answer a query from the last committed state. Never fails.
    ///
    /// `?WL` reports the stored wavelength as is: the calibration offset was
    /// already added when the move committed.
    fn query(&self, query: Query) -> QueryReply {
        let state = self.state.lock();
        match query {
            Query::Wavelength => QueryReply::Wavelength(state.wavelength),
            Query::Grating => QueryReply::Grating(state.grating),
            Query::EntranceSlit => QueryReply::EntranceSlit(state.entrance_slit_position),
            Query::ExitSlit => QueryReply::ExitSlit(state.exit_slit_position),
            Query::Status => QueryReply::Status(state.status),
        }
    }

    // ========================================================================
    // Command handlers
    // ========================================================================

    /// Status and busy gates shared by every command except reset.
    fn admit(state: &DeviceState) -> Result<(), Reply> {
        if state.status != DeviceStatus::Ready {
            Err(Reply::Rejected)
        } else if state.busy {
            Err(Reply::Busy)
        } else {
            Ok(())
        }
    }

    /// Parse and range-check one argument for a positional command.
    fn validate(&self, verb: CommandVerb, raw: Option<&String>) -> Result<Target, Reply> {
        let raw = raw.map(String::as_str).unwrap_or_default();

        match verb {
            CommandVerb::Grating => {
                let grating: i32 = raw.parse().map_err(|_| Reply::Rejected)?;
                if !self.config.grating_options.contains(&grating) {
                    return Err(Reply::OutOfRange);
                }
                Ok(Target::Grating(grating))
            }
            _ => {
                let value: f64 = raw.parse().map_err(|_| Reply::Rejected)?;
                let (range, target) = match verb {
                    CommandVerb::EntranceSlit => {
                        (self.config.entrance_slit_range(), Target::EntranceSlit(value))
                    }
                    CommandVerb::ExitSlit => (self.config.exit_slit_range(), Target::ExitSlit(value)),
                    _ => (self.config.wavelength_range(), Target::Wavelength(value)),
                };
                if !in_range(value, range) {
                    return Err(Reply::OutOfRange);
                }
                Ok(target)
            }
        }
    }

    /// Commit a validated move.
    fn apply(&self, state: &mut DeviceState, target: Target) {
        match target {
            Target::Wavelength(value) => {
                // The offset may push the result out of range; clamp it back
                let (min, max) = self.config.wavelength_range();
                let wavelength = value + state.wavelength_offset;
                state.wavelength = if wavelength > max {
                    max
                } else if wavelength < min {
                    min
                } else {
                    wavelength
                };
            }
            Target::Grating(value) => state.grating = value,
            Target::EntranceSlit(value) => state.entrance_slit_position = value,
            Target::ExitSlit(value) => state.exit_slit_position = value,
        }
    }

    /// `!WL`, `!GR`, `!ENS`, `!EXS`.
    async fn move_to(&self, verb: CommandVerb, args: &[String]) -> Reply {
        let target = {
            let mut state = self.state.lock();
            if let Err(reply) = Self::admit(&state) {
                return reply;
            }
            let target = match self.validate(verb, args.first()) {
                Ok(target) => target,
                Err(reply) => return reply,
            };
            state.busy = true;
            target
        };
        let busy = BusyGuard::hold(&self.state, None);

        #[cfg(test)]
        if self.panic_next_move.swap(false, Ordering::SeqCst) {
            panic!("simulated handler failure");
        }

        tokio::time::sleep(self.config.actuation_delay()).await;

        self.apply(&mut self.state.lock(), target);
        busy.finish();
        Reply::Ok
    }

    /// `!SET <wl> <gr> <ens> <exs>`.
    ///
    /// All four values are validated, in order, before anything moves. The
    /// first failure is returned and no field changes.
    async fn set_all(&self, args: &[String]) -> Reply {
        if args.len() != 4 {
            return Reply::Rejected;
        }

        let targets = {
            let mut state = self.state.lock();
            if let Err(reply) = Self::admit(&state) {
                return reply;
            }

            let verbs = [
                CommandVerb::Wavelength,
                CommandVerb::Grating,
                CommandVerb::EntranceSlit,
                CommandVerb::ExitSlit,
            ];
            let targets: Result<Vec<Target>, Reply> = verbs
                .into_iter()
                .zip(args)
                .map(|(verb, raw)| self.validate(verb, Some(raw)))
                .collect();

            match targets {
                Ok(targets) => {
                    state.busy = true;
                    targets
                }
                Err(reply) => return reply,
            }
        };
        let busy = BusyGuard::hold(&self.state, None);

        for target in targets {
            tokio::time::sleep(self.config.actuation_delay()).await;
            self.apply(&mut self.state.lock(), target);
        }

        busy.finish();
        Reply::Ok
    }

    /// `!CLW <offset>`.
    ///
    /// The resulting wavelength is checked against the exit slit range, as the
    /// controller firmware does. No actuation delay.
    fn calibrate_wavelength(&self, args: &[String]) -> Reply {
        let mut state = self.state.lock();
        if let Err(reply) = Self::admit(&state) {
            return reply;
        }

        let Some(offset) = args.first().and_then(|raw| raw.parse::<f64>().ok()) else {
            return Reply::Rejected;
        };

        if !in_range(state.wavelength + offset, self.config.exit_slit_range()) {
            return Reply::OutOfRange;
        }

        state.wavelength_offset = offset;
        Reply::Ok
    }

    /// `!RST 1`.
    ///
    /// Accepted in any status as long as the controller is not busy. Walks the
    /// axes back to their home positions one at a time, then reports READY.
    async fn reset(&self, args: &[String]) -> Reply {
        let previous = {
            let mut state = self.state.lock();
            if state.busy {
                return Reply::Busy;
            }

            match args.first().map(|raw| raw.parse::<i64>()) {
                Some(Ok(1)) => {}
                other => {
                    debug!(?other, "Reset rejected");
                    return Reply::Rejected;
                }
            }

            info!("Starting reset");
            let previous = state.status;
            state.status = DeviceStatus::SettingUp;
            state.busy = true;
            previous
        };
        let busy = BusyGuard::hold(&self.state, Some(previous));

        let delay = self.config.actuation_delay();
        tokio::time::sleep(delay).await;

        debug!("Resetting wavelength");
        {
            let mut state = self.state.lock();
            state.wavelength_offset = 0.0;
            state.wavelength = self.config.min_wavelength;
        }
        tokio::time::sleep(delay).await;

        debug!("Resetting entrance slit");
        self.state.lock().entrance_slit_position = self.config.min_slit_width;
        tokio::time::sleep(delay).await;

        debug!("Resetting exit slit");
        self.state.lock().exit_slit_position = self.config.min_slit_width;
        tokio::time::sleep(delay).await;

        debug!("Resetting grating");
        self.state.lock().grating = self.home_grating;
        tokio::time::sleep(delay).await;

        self.state.lock().status = DeviceStatus::Ready;
        busy.finish();
        info!("Reset done");
        Reply::Ok
    }
}
