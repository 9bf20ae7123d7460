//! Device command lanes
//!
//! Commands for one sensor run strictly in issue order on that sensor's
//! lane task; different sensors run concurrently. Lanes never drop a
//! command: while a slow device is busy, a queued `Send` is replaced by a
//! newer `Send` of the same group. A panicking driver call is caught and
//! logged so the lane keeps serving later commands.

use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::registry::DeviceCommand;
use crate::cache::DeviceCache;
use crate::domain::SensorInfo;
use crate::drivers::{AlarmDevice, DriverTable};

enum LaneJob {
    Run {
        sensor: Arc<SensorInfo>,
        driver: Arc<dyn AlarmDevice>,
        command: DeviceCommand,
    },
    /// Completes once every earlier job on the lane has finished
    Barrier(oneshot::Sender<()>),
}

/// Pending jobs of one lane
#[derive(Default)]
struct LaneQueue {
    jobs: Mutex<VecDeque<LaneJob>>,
    ready: Notify,
    closed: AtomicBool,
}

impl LaneQueue {
    /// Queue `job` and return the resulting depth
    fn push(&self, job: LaneJob) -> usize {
        let depth = {
            let mut jobs = self.jobs.lock();
            enqueue(&mut jobs, job);
            jobs.len()
        };
        self.ready.notify_one();
        depth
    }

    /// Jobs already queued still run; the lane task exits once they are done
    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.ready.notify_one();
    }

    async fn next(&self) -> Option<LaneJob> {
        loop {
            let job = self.jobs.lock().pop_front();
            if job.is_some() {
                return job;
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.ready.notified().await;
        }
    }
}

/// Append `job`, replacing a trailing `Send` it supersedes
fn enqueue(jobs: &mut VecDeque<LaneJob>, job: LaneJob) {
    if let (
        LaneJob::Run { command, .. },
        Some(LaneJob::Run {
            command: queued, ..
        }),
    ) = (&job, jobs.back())
    {
        if command.supersedes(queued) {
            debug!("Superseded queued command {:?}", queued);
            jobs.pop_back();
        }
    }
    jobs.push_back(job);
}

struct Lane {
    queue: Arc<LaneQueue>,
    task: JoinHandle<()>,
}

pub struct CommandDispatcher {
    cache: Arc<DeviceCache>,
    drivers: DriverTable,
    lanes: HashMap<String, Lane>,
    backlog_warn: usize,
}

impl CommandDispatcher {
    pub fn new(cache: Arc<DeviceCache>, drivers: DriverTable, backlog_warn: usize) -> Self {
        Self {
            cache,
            drivers,
            lanes: HashMap::new(),
            backlog_warn: backlog_warn.max(1),
        }
    }

    pub fn drivers(&self) -> &DriverTable {
        &self.drivers
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Resolve the sensor and queue the command on its lane
    ///
    /// Unknown sensors, types or drivers are logged and dropped.
    pub fn dispatch(&mut self, command: DeviceCommand) {
        let Some((sensor, protocol)) = self.cache.lookup(command.sensor_id()) else {
            return;
        };
        let Some(driver) = self.drivers.get(protocol) else {
            error!("No alarm driver registered for protocol '{}'", protocol);
            return;
        };

        let lane = self
            .lanes
            .entry(sensor.id.clone())
            .or_insert_with(|| spawn_lane(sensor.id.clone()));

        let sensor_id = sensor.id.clone();
        let depth = lane.queue.push(LaneJob::Run {
            sensor,
            driver,
            command,
        });
        if depth == self.backlog_warn + 1 {
            warn!(
                "Command lane for sensor {} is backing up ({} queued)",
                sensor_id, depth
            );
        }
    }

    /// Wait handles that resolve once every queued command has run
    pub fn barriers(&self) -> Vec<oneshot::Receiver<()>> {
        self.lanes
            .values()
            .map(|lane| {
                let (tx, rx) = oneshot::channel();
                lane.queue.push(LaneJob::Barrier(tx));
                rx
            })
            .collect()
    }

    /// Close the lanes of sensors no longer in the cache; returns how many
    ///
    /// A closed lane finishes its queued commands in the background.
    pub fn prune_lanes(&mut self) -> usize {
        let snapshot = self.cache.snapshot();
        let before = self.lanes.len();
        self.lanes.retain(|sensor_id, lane| {
            if snapshot.contains(sensor_id) {
                return true;
            }
            lane.queue.close();
            false
        });
        before - self.lanes.len()
    }

    /// Close every lane and wait for queued commands to finish
    pub async fn close(&mut self) {
        for (sensor_id, lane) in self.lanes.drain() {
            lane.queue.close();
            if let Err(e) = lane.task.await {
                error!("Command lane for sensor {} ended abnormally: {}", sensor_id, e);
            }
        }
    }
}

impl std::fmt::Debug for LaneJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaneJob::Run { command, .. } => write!(f, "Run({:?})", command),
            LaneJob::Barrier(_) => write!(f, "Barrier"),
        }
    }
}

fn spawn_lane(sensor_id: String) -> Lane {
    let queue = Arc::new(LaneQueue::default());
    let task = tokio::spawn(run_lane(sensor_id, Arc::clone(&queue)));
    Lane { queue, task }
}

async fn run_lane(sensor_id: String, queue: Arc<LaneQueue>) {
    debug!("Command lane for sensor {} started", sensor_id);
    while let Some(job) = queue.next().await {
        match job {
            LaneJob::Run {
                sensor,
                driver,
                command,
            } => {
                let call = AssertUnwindSafe(execute(&sensor, driver.as_ref(), command));
                if let Err(panic) = call.catch_unwind().await {
                    error!(
                        "Driver {} panicked on sensor {} ({}): {}",
                        driver.protocol(),
                        sensor.id,
                        sensor.name,
                        panic_message(panic.as_ref())
                    );
                }
            },
            LaneJob::Barrier(done) => {
                let _ = done.send(());
            },
        }
    }
    info!("Command lane for sensor {} closed", sensor_id);
}

async fn execute(sensor: &SensorInfo, driver: &dyn AlarmDevice, command: DeviceCommand) {
    match command {
        DeviceCommand::Send { alarms, .. } => {
            let outcome = driver.send(sensor, &alarms).await;
            outcome.log("Send", sensor, alarms.first());
        },
        DeviceCommand::Stop { alarm, .. } => {
            let outcome = driver.stop(sensor, &alarm).await;
            outcome.log("Stop", sensor, Some(&alarm));
        },
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::cache::MemorySensorStore;
    use crate::domain::AlarmMessage;
    use crate::drivers::Adam6050Driver;

    fn alarm(value: &str) -> AlarmMessage {
        AlarmMessage {
            sensor_id: "s1".into(),
            type_id: "t-adam".into(),
            alarm_type: "LED".into(),
            alarm_value: value.into(),
            duration_ms: 5000,
            regen_interval_ms: 0,
            priority: 0,
            on_off: None,
        }
    }

    fn run(command: DeviceCommand) -> LaneJob {
        LaneJob::Run {
            sensor: Arc::new(SensorInfo::new("s1", "relay", "t-adam", "10.0.0.1", 502)),
            driver: Arc::new(Adam6050Driver::new()),
            command,
        }
    }

    fn send(value: &str) -> DeviceCommand {
        DeviceCommand::Send {
            sensor_id: "s1".into(),
            alarms: vec![alarm(value)],
        }
    }

    fn stop(value: &str) -> DeviceCommand {
        DeviceCommand::Stop {
            sensor_id: "s1".into(),
            alarm: alarm(value),
        }
    }

    fn queued(jobs: &VecDeque<LaneJob>) -> Vec<DeviceCommand> {
        jobs.iter()
            .filter_map(|job| match job {
                LaneJob::Run { command, .. } => Some(command.clone()),
                LaneJob::Barrier(_) => None,
            })
            .collect()
    }

    #[test]
    fn test_repeated_sends_collapse_but_stops_stay() {
        let mut jobs = VecDeque::new();
        for _ in 0..80 {
            enqueue(&mut jobs, run(send("RED")));
        }
        enqueue(&mut jobs, run(stop("RED")));
        enqueue(&mut jobs, run(send("YELLOW")));
        enqueue(&mut jobs, run(send("YELLOW")));

        assert_eq!(
            queued(&jobs),
            vec![send("RED"), stop("RED"), send("YELLOW")]
        );
    }

    #[test]
    fn test_barrier_is_not_jumped() {
        let mut jobs = VecDeque::new();
        enqueue(&mut jobs, run(send("RED")));
        let (tx, _rx) = oneshot::channel();
        enqueue(&mut jobs, LaneJob::Barrier(tx));
        enqueue(&mut jobs, run(send("RED")));

        assert_eq!(jobs.len(), 3);
    }

    #[tokio::test]
    async fn test_closed_lane_drains_queue_first() {
        let queue = LaneQueue::default();
        queue.push(run(send("RED")));
        queue.push(run(stop("RED")));
        queue.close();

        assert!(queue.next().await.is_some());
        assert!(queue.next().await.is_some());
        assert!(queue.next().await.is_none());
    }

    #[tokio::test]
    async fn test_prune_drops_lanes_of_removed_sensors() {
        let store = Arc::new(MemorySensorStore::new());
        store.upsert_type("t-adam", "Adam6050");
        store.upsert_sensor(SensorInfo::new("s1", "relay", "t-adam", "10.0.0.1", 502));
        store.upsert_sensor(SensorInfo::new("s2", "relay", "t-adam", "10.0.0.2", 502));
        let cache = Arc::new(DeviceCache::new(store.clone()));
        cache.reload().await.unwrap();

        let drivers = DriverTable::new().with_driver(Arc::new(Adam6050Driver::new()));
        let mut dispatcher = CommandDispatcher::new(Arc::clone(&cache), drivers, 64);
        dispatcher.dispatch(send("RED"));
        dispatcher.dispatch(DeviceCommand::Send {
            sensor_id: "s2".into(),
            alarms: vec![alarm("RED")],
        });
        assert_eq!(dispatcher.lane_count(), 2);

        store.remove_sensor("s1");
        cache.reload().await.unwrap();
        assert_eq!(dispatcher.prune_lanes(), 1);
        assert_eq!(dispatcher.lane_count(), 1);

        for barrier in dispatcher.barriers() {
            barrier.await.unwrap();
        }
        dispatcher.close().await;
    }
}
