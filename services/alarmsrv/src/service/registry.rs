//! Active alarm set
//!
//! Pure state machine: applying a batch or a countdown tick mutates the
//! per-sensor alarm lists and returns the device commands that follow, in
//! the order they must be issued.

use serde::Serialize;
use std::collections::HashMap;
use tracing::info;

use crate::domain::AlarmMessage;

/// Device command produced by a state transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceCommand {
    /// Full current alarm list of one (sensor, type) group
    Send {
        sensor_id: String,
        alarms: Vec<AlarmMessage>,
    },
    /// Clear the state set for `alarm`
    Stop {
        sensor_id: String,
        alarm: AlarmMessage,
    },
}

impl DeviceCommand {
    pub fn sensor_id(&self) -> &str {
        match self {
            DeviceCommand::Send { sensor_id, .. } | DeviceCommand::Stop { sensor_id, .. } => {
                sensor_id
            },
        }
    }

    /// A `Send` makes an earlier, not yet executed `Send` of the same
    /// (sensor, type) group redundant since both carry the full state
    pub fn supersedes(&self, queued: &DeviceCommand) -> bool {
        match (self, queued) {
            (
                DeviceCommand::Send { sensor_id, alarms },
                DeviceCommand::Send {
                    sensor_id: queued_id,
                    alarms: queued_alarms,
                },
            ) => {
                sensor_id == queued_id
                    && alarms.first().map(|a| &a.type_id)
                        == queued_alarms.first().map(|a| &a.type_id)
            },
            _ => false,
        }
    }
}

/// Active alarms of one sensor, as reported by the admin API
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveSensor {
    pub sensor_id: String,
    pub alarms: Vec<AlarmMessage>,
}

#[derive(Debug, Default)]
pub struct AlarmRegistry {
    active: HashMap<String, Vec<AlarmMessage>>,
}

impl AlarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn sensor_count(&self) -> usize {
        self.active.len()
    }

    pub fn alarms(&self, sensor_id: &str) -> Option<&[AlarmMessage]> {
        self.active.get(sensor_id).map(Vec::as_slice)
    }

    /// Merge a batch of target states
    ///
    /// Messages are grouped by (sensor, type) in first-appearance order. An
    /// existing alarm in the same (category, type) slot is refreshed in
    /// place; if its value changed a `Stop` for the old value comes first.
    /// Each group ends with one `Send` carrying every active alarm of that
    /// sensor and type.
    pub fn apply_batch(&mut self, batch: Vec<AlarmMessage>) -> Vec<DeviceCommand> {
        let mut groups: Vec<((String, String), Vec<AlarmMessage>)> = Vec::new();
        for msg in batch {
            let key = (msg.sensor_id.clone(), msg.type_id.clone());
            match groups.iter_mut().find(|(k, _)| *k == key) {
                Some((_, members)) => members.push(msg),
                None => groups.push((key, vec![msg])),
            }
        }

        let mut commands = Vec::new();
        for ((sensor_id, type_id), members) in groups {
            let alarms = self.active.entry(sensor_id.clone()).or_default();

            for msg in members {
                match alarms.iter_mut().find(|a| a.same_slot(&msg)) {
                    None => alarms.push(msg),
                    Some(existing) => {
                        if existing.alarm_value != msg.alarm_value {
                            commands.push(DeviceCommand::Stop {
                                sensor_id: sensor_id.clone(),
                                alarm: existing.clone(),
                            });
                        }
                        existing.alarm_value = msg.alarm_value;
                        existing.duration_ms = msg.duration_ms;
                        existing.regen_interval_ms = msg.regen_interval_ms;
                        existing.priority = msg.priority;
                    },
                }
            }

            let current: Vec<AlarmMessage> = alarms
                .iter()
                .filter(|a| a.type_id == type_id)
                .cloned()
                .collect();
            info!(
                "Updated alarms: sensor_id={}, typeId={}, count={}",
                sensor_id,
                type_id,
                alarms.len()
            );
            commands.push(DeviceCommand::Send {
                sensor_id,
                alarms: current,
            });
        }
        commands
    }

    /// Count every active alarm down by `elapsed_ms`
    ///
    /// Alarms at or below zero are removed. A sensor left with no alarms is
    /// dropped and gets one `Stop` carrying the last alarm that expired.
    pub fn tick(&mut self, elapsed_ms: i64) -> Vec<DeviceCommand> {
        let mut commands = Vec::new();

        self.active.retain(|sensor_id, alarms| {
            let mut last_expired = None;
            alarms.retain_mut(|alarm| {
                alarm.duration_ms -= elapsed_ms;
                if alarm.duration_ms > 0 {
                    return true;
                }
                info!(
                    "Alarm expired: sensor_id={}, typeId={}, alarmType={}",
                    sensor_id, alarm.type_id, alarm.alarm_type
                );
                last_expired = Some(alarm.clone());
                false
            });

            if !alarms.is_empty() {
                return true;
            }
            if let Some(alarm) = last_expired {
                commands.push(DeviceCommand::Stop {
                    sensor_id: sensor_id.clone(),
                    alarm,
                });
            }
            false
        });

        commands
    }

    /// Stop every active alarm and forget all state
    pub fn drain_all(&mut self) -> Vec<DeviceCommand> {
        self.active
            .drain()
            .flat_map(|(sensor_id, alarms)| {
                alarms.into_iter().map(move |alarm| DeviceCommand::Stop {
                    sensor_id: sensor_id.clone(),
                    alarm,
                })
            })
            .collect()
    }

    /// Sorted by sensor id
    pub fn snapshot(&self) -> Vec<ActiveSensor> {
        let mut sensors: Vec<ActiveSensor> = self
            .active
            .iter()
            .map(|(sensor_id, alarms)| ActiveSensor {
                sensor_id: sensor_id.clone(),
                alarms: alarms.clone(),
            })
            .collect();
        sensors.sort_by(|a, b| a.sensor_id.cmp(&b.sensor_id));
        sensors
    }
}
