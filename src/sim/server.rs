use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam::channel::{RecvTimeoutError, SendTimeoutError};
use tracing::{debug, info, warn};

use super::plant::{PlantConfig, SegwayPlant};
use crate::error::{NotFoundError, SessionError};
use crate::session::channel::{Reply, Request, Response, SimChannels};
use crate::session::{ObjectHandle, ObjectNames};

const CODE_NOT_RUNNING: i32 = 1;
const CODE_ALREADY_RUNNING: i32 = 2;
const CODE_BAD_HANDLE: i32 = 3;

pub struct SimulatorStats {
    pub requests: AtomicU64,
    pub ticks: AtomicU64,
    pub episodes: AtomicU64,
    /// While set the simulator swallows requests without answering.
    pub frozen: AtomicBool,
    pub shutdown: AtomicBool,
}

impl SimulatorStats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            requests: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            episodes: AtomicU64::new(0),
            frozen: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        })
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum SceneObject {
    Body,
    LeftMotor,
    RightMotor,
}

struct Scene {
    plant: SegwayPlant,
    by_name: HashMap<String, ObjectHandle>,
    by_handle: HashMap<ObjectHandle, SceneObject>,
    running: bool,
}

impl Scene {
    fn new(config: PlantConfig, names: &ObjectNames) -> Self {
        let objects = [
            (names.body.as_str(), SceneObject::Body),
            (names.left_motor.as_str(), SceneObject::LeftMotor),
            (names.right_motor.as_str(), SceneObject::RightMotor),
        ];

        let mut by_name = HashMap::new();
        let mut by_handle = HashMap::new();
        for (i, (name, object)) in objects.into_iter().enumerate() {
            let handle = ObjectHandle(i as i32 + 16);
            by_name.insert(name.to_string(), handle);
            by_handle.insert(handle, object);
        }

        Self {
            plant: SegwayPlant::new(config),
            by_name,
            by_handle,
            running: false,
        }
    }

    fn not_running() -> SessionError {
        SessionError::Remote {
            code: CODE_NOT_RUNNING,
            message: "no simulation running".to_string(),
        }
    }

    fn lookup(&self, handle: ObjectHandle) -> Result<SceneObject, SessionError> {
        self.by_handle.get(&handle).copied().ok_or_else(|| SessionError::Remote {
            code: CODE_BAD_HANDLE,
            message: format!("unknown handle {}", handle.0),
        })
    }

    fn handle(&mut self, request: Request, stats: &SimulatorStats) -> Result<Response, SessionError> {
        match request {
            Request::ResolveHandle(name) => match self.by_name.get(&name) {
                Some(handle) => Ok(Response::Handle(*handle)),
                None => Err(NotFoundError { name }.into()),
            },
            Request::StartEpisode => {
                if self.running {
                    return Err(SessionError::Remote {
                        code: CODE_ALREADY_RUNNING,
                        message: "simulation already running".to_string(),
                    });
                }
                self.plant.reset();
                self.running = true;
                stats.episodes.fetch_add(1, Ordering::Relaxed);
                Ok(Response::Done)
            }
            Request::StopEpisode => {
                self.running = false;
                Ok(Response::Done)
            }
            Request::ReadOrientation(handle) => {
                if self.lookup(handle)? != SceneObject::Body {
                    return Err(SessionError::Remote {
                        code: CODE_BAD_HANDLE,
                        message: format!("handle {} has no orientation", handle.0),
                    });
                }
                if !self.running {
                    return Err(Self::not_running());
                }
                Ok(Response::Orientation(self.plant.read()))
            }
            Request::SetMotorVelocity(handle, velocity) => {
                match self.lookup(handle)? {
                    SceneObject::LeftMotor => self.plant.set_left_motor(velocity),
                    SceneObject::RightMotor => self.plant.set_right_motor(velocity),
                    SceneObject::Body => {
                        return Err(SessionError::Remote {
                            code: CODE_BAD_HANDLE,
                            message: format!("handle {} is not a motor", handle.0),
                        })
                    }
                }
                Ok(Response::Done)
            }
            Request::TriggerStep => {
                if !self.running {
                    return Err(Self::not_running());
                }
                self.plant.advance_tick();
                stats.ticks.fetch_add(1, Ordering::Relaxed);
                Ok(Response::Done)
            }
        }
    }
}

pub fn spawn_simulator(
    config: PlantConfig,
    names: ObjectNames,
    channels: SimChannels,
) -> (thread::JoinHandle<()>, Arc<SimulatorStats>) {
    let stats = SimulatorStats::new();
    let stats_clone = stats.clone();

    let handle = thread::spawn(move || {
        let mut scene = Scene::new(config, &names);
        info!(
            body = %names.body,
            left = %names.left_motor,
            right = %names.right_motor,
            "simulator ready"
        );

        loop {
            if stats_clone.shutdown.load(Ordering::Relaxed) {
                info!(
                    ticks = scene.plant.step_count(),
                    "simulator shutting down"
                );
                break;
            }

            // Receive with timeout to allow shutdown check
            let envelope = match channels.request_rx.recv_timeout(Duration::from_millis(100)) {
                Ok(e) => e,
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("all sessions closed");
                    break;
                }
            };

            stats_clone.requests.fetch_add(1, Ordering::Relaxed);
            if stats_clone.frozen.load(Ordering::Relaxed) {
                continue;
            }

            let result = scene.handle(envelope.request, &stats_clone);
            if let Err(e) = &result {
                debug!(seq = envelope.seq, error = %e, "request failed");
            }

            let reply = Reply { seq: envelope.seq, result };
            match channels.reply_tx.send_timeout(reply, Duration::from_millis(100)) {
                Ok(()) => {}
                Err(SendTimeoutError::Timeout(dropped)) => {
                    warn!(seq = dropped.seq, "nobody reading replies, dropping");
                }
                Err(SendTimeoutError::Disconnected(_)) => {
                    warn!("reply channel closed");
                    break;
                }
            }
        }
    });

    (handle, stats)
}
