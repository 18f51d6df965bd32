//! Pass-through stage that lets a callback observe every span

use std::sync::Arc;

use super::lifecycle::{StageCell, StageLink, StageOptions};
use super::{AudioOutput, Observer, Signal, Subscription};
use crate::audio::format::AudioFormat;

type TapCallback = Box<dyn Fn(&[u8]) + Send + Sync>;

/// Calls a callback for each span, then forwards the span unchanged
pub struct TapStage {
    link: StageLink,
    cell: StageCell<TapCallback>,
}

impl TapStage {
    pub fn new<F>(upstream: Arc<dyn AudioOutput>, callback: F, options: StageOptions) -> Arc<Self>
    where
        F: Fn(&[u8]) + Send + Sync + 'static,
    {
        let stage = Arc::new(Self {
            link: StageLink::new(upstream, options.owns_upstream),
            cell: StageCell::new(Box::new(callback)),
        });
        stage.link.attach(&stage, Self::on_signal);
        stage
    }

    fn on_signal(&self, signal: Signal<'_>) {
        match signal {
            Signal::Data(span) => {
                let subject = self.link.subject();
                self.cell.with(|callback| {
                    callback(span);
                    subject.next(span);
                });
            }
            Signal::Completed => self.link.subject().complete(),
            Signal::Failed(error) => self.link.subject().fail(error),
        }
    }
}

impl AudioOutput for TapStage {
    fn format(&self) -> AudioFormat {
        self.link.format()
    }

    fn subscribe(&self, observer: Observer) -> Subscription {
        self.link.subscribe(observer)
    }

    fn dispose(&self) {
        if self.cell.dispose() {
            self.link.teardown();
        }
    }

    fn is_disposed(&self) -> bool {
        self.cell.is_disposed()
    }
}

impl Drop for TapStage {
    fn drop(&mut self) {
        self.dispose();
    }
}
