//! Synchronized multi-channel radiometer sampling.
//!
//! Each physical channel gets its own worker thread so integration can run
//! in parallel; `sample_all` is the synchronization barrier the orchestrator
//! calls. It blocks until every channel has produced a spectrum or been
//! skipped, and returns the responding channels only.
//!
//! Skip semantics: a channel that misses the sampling deadline or reports a
//! recoverable device error is skipped for that trigger. A channel whose
//! worker has died (terminal [`DeviceError::NotAvailable`], hung-up queue)
//! fails the whole sampling call — the orchestrator treats that as a cycle
//! fault and tears the system down.

use std::sync::mpsc;
use std::time::{Duration, Instant};

use sorad_common::error::DeviceError;
use sorad_common::types::{ChannelSample, TriggerId};
use tracing::{debug, error, warn};

use crate::worker::Worker;

/// One radiometer channel as seen by its worker thread.
pub trait RadiometerChannel: Send {
    /// Channel identifier (serial number).
    fn id(&self) -> &str;

    /// Cheap liveness probe used by the readiness predicate.
    fn is_responsive(&mut self) -> bool;

    /// Acquire one spectrum for the trigger. Blocks for the integration
    /// time. A terminal failure must be reported as
    /// [`DeviceError::NotAvailable`]; anything else is treated as
    /// recoverable and only skips this trigger.
    fn sample(&mut self, trigger: TriggerId) -> Result<ChannelSample, DeviceError>;
}

enum Request {
    Ping(mpsc::Sender<bool>),
    Sample(TriggerId, mpsc::Sender<Result<ChannelSample, DeviceError>>),
}

struct ChannelHandle {
    id: String,
    requests: mpsc::Sender<Request>,
    worker: Worker,
}

/// Result of one synchronized sampling call: the responding channels'
/// samples, in channel order.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleSet {
    pub trigger_id: TriggerId,
    pub samples: Vec<ChannelSample>,
}

impl SampleSet {
    /// Channel ids, parallel to `integration_times` and `spectra`.
    pub fn channel_ids(&self) -> Vec<&str> {
        self.samples.iter().map(|s| s.channel_id.as_str()).collect()
    }

    /// Integration times [ms], parallel to `channel_ids`.
    pub fn integration_times(&self) -> Vec<u32> {
        self.samples.iter().map(|s| s.integration_time_ms).collect()
    }

    /// Spectra, parallel to `channel_ids`.
    pub fn spectra(&self) -> Vec<&[u16]> {
        self.samples.iter().map(|s| s.spectrum.as_slice()).collect()
    }
}

/// Owns the channel worker threads and the sampling barrier.
pub struct RadiometerManager {
    channels: Vec<ChannelHandle>,
    sample_timeout: Duration,
}

impl RadiometerManager {
    /// How long a readiness ping may take per channel.
    const PING_TIMEOUT: Duration = Duration::from_millis(500);
    /// Worker queue poll granularity; bounds stop-flag latency.
    const QUEUE_POLL: Duration = Duration::from_millis(200);

    /// Spawn one worker per channel.
    pub fn start(
        channels: Vec<Box<dyn RadiometerChannel>>,
        sample_timeout: Duration,
    ) -> Result<Self, DeviceError> {
        let mut handles = Vec::with_capacity(channels.len());
        for mut channel in channels {
            let id = channel.id().to_string();
            let (tx, rx) = mpsc::channel::<Request>();
            let thread_name = format!("rad-{id}");

            let worker = Worker::spawn(&thread_name, move |stop| {
                loop {
                    if stop.load(std::sync::atomic::Ordering::Relaxed) {
                        break;
                    }
                    match rx.recv_timeout(Self::QUEUE_POLL) {
                        Ok(Request::Ping(reply)) => {
                            let _ = reply.send(channel.is_responsive());
                        }
                        Ok(Request::Sample(trigger, reply)) => match channel.sample(trigger) {
                            Err(DeviceError::NotAvailable(reason)) => {
                                // Terminal: drop the reply unanswered so the
                                // barrier sees the hang-up, and exit.
                                error!("Channel {} is gone: {reason}", channel.id());
                                drop(reply);
                                break;
                            }
                            result => {
                                let _ = reply.send(result);
                            }
                        },
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                        Err(mpsc::RecvTimeoutError::Disconnected) => break,
                    }
                }
                debug!("Channel worker {} stopping", channel.id());
            })
            .map_err(|e| DeviceError::Io(format!("spawn channel worker: {e}")))?;

            handles.push(ChannelHandle {
                id,
                requests: tx,
                worker,
            });
        }
        Ok(Self {
            channels: handles,
            sample_timeout,
        })
    }

    /// Number of configured channels.
    #[inline]
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Readiness predicate: every channel answers a liveness ping.
    pub fn ready(&self) -> bool {
        self.channels.iter().all(|ch| {
            let (reply_tx, reply_rx) = mpsc::channel();
            if ch.requests.send(Request::Ping(reply_tx)).is_err() {
                return false;
            }
            matches!(reply_rx.recv_timeout(Self::PING_TIMEOUT), Ok(true))
        })
    }

    /// The synchronization barrier. Returns once every channel has produced
    /// a spectrum or been skipped; responding channels only appear in the
    /// result.
    ///
    /// # Errors
    ///
    /// Fails when a channel worker has died — that is a platform fault, not
    /// a skip.
    pub fn sample_all(&self, trigger: TriggerId) -> Result<SampleSet, DeviceError> {
        let deadline = Instant::now() + self.sample_timeout;

        let mut pending = Vec::with_capacity(self.channels.len());
        for ch in &self.channels {
            let (reply_tx, reply_rx) = mpsc::channel();
            ch.requests
                .send(Request::Sample(trigger, reply_tx))
                .map_err(|_| {
                    DeviceError::Io(format!("channel {} worker is gone", ch.id))
                })?;
            pending.push((ch.id.as_str(), reply_rx));
        }

        let mut samples = Vec::with_capacity(pending.len());
        for (id, reply_rx) in pending {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match reply_rx.recv_timeout(remaining) {
                Ok(Ok(sample)) => samples.push(sample),
                Ok(Err(e)) => warn!("Channel {id} skipped for {trigger}: {e}"),
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    warn!("Channel {id} missed the sampling deadline for {trigger}")
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => {
                    return Err(DeviceError::Io(format!(
                        "channel {id} worker died during sampling"
                    )));
                }
            }
        }

        Ok(SampleSet {
            trigger_id: trigger,
            samples,
        })
    }

    /// Raise every worker's stop flag without joining.
    pub fn request_stop(&self) {
        for ch in &self.channels {
            ch.worker.request_stop();
        }
    }

    /// Borrow the workers for the teardown roster.
    pub fn workers_mut(&mut self) -> impl Iterator<Item = &mut Worker> {
        self.channels.iter_mut().map(|ch| &mut ch.worker)
    }
}
