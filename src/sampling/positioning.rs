use anyhow::Result;
use tokio::sync::mpsc;

use crate::models::PositionUpdate;

use super::estimator::SamplingPeriod;

/// Queue the positioning collaborator delivers updates on.
pub type UpdateSink = mpsc::Sender<PositionUpdate>;

/// The device's positioning service.
///
/// `start_updates` replaces any earlier request: after it returns, updates
/// arrive on `sink` roughly every `period` until the next `start_updates` or
/// `stop_updates`. Implementations must not block.
pub trait PositioningService: Send + Sync + 'static {
    fn start_updates(&self, period: SamplingPeriod, sink: UpdateSink) -> Result<()>;

    fn stop_updates(&self);

    /// Most recent position known before updates were requested, if any.
    fn last_known(&self) -> Option<PositionUpdate> {
        None
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    pub enum PositioningCall {
        Start(SamplingPeriod),
        Stop,
    }

    /// Records requests and keeps the latest sink so tests can push updates.
    #[derive(Default, Clone)]
    pub struct RecordingPositioning {
        pub calls: Arc<Mutex<Vec<PositioningCall>>>,
        pub sink: Arc<Mutex<Option<UpdateSink>>>,
        pub last_known: Option<PositionUpdate>,
    }

    impl RecordingPositioning {
        pub fn calls(&self) -> Vec<PositioningCall> {
            self.calls.lock().unwrap().clone()
        }

        pub async fn push(&self, update: PositionUpdate) {
            let sink = self.sink.lock().unwrap().clone().expect("updates not started");
            sink.send(update).await.expect("controller dropped its queue");
        }
    }

    impl PositioningService for RecordingPositioning {
        fn start_updates(&self, period: SamplingPeriod, sink: UpdateSink) -> Result<()> {
            self.calls.lock().unwrap().push(PositioningCall::Start(period));
            *self.sink.lock().unwrap() = Some(sink);
            Ok(())
        }

        fn stop_updates(&self) {
            self.calls.lock().unwrap().push(PositioningCall::Stop);
            self.sink.lock().unwrap().take();
        }

        fn last_known(&self) -> Option<PositionUpdate> {
            self.last_known
        }
    }
}
