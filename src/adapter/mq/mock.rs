use std::boxed::Box;
use std::result::Result;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender, WeakUnboundedSender};
use tokio::sync::Mutex;

use super::{
    AbstractIntentDelivery, AbstractIntentQueue, AbstractIntentStream, AppQueueError,
    AppQueueErrorFnLabel, AppQueueErrorReason,
};
use crate::model::OrderIntent;

/// broker stand-in for development and tests, an unbounded in-process
/// channel with a single subscriber
pub struct AppMockIntentQueue {
    _tx: UnboundedSender<OrderIntent>,
    _rx: Mutex<Option<UnboundedReceiver<OrderIntent>>>,
    _num_acked: Arc<AtomicU32>,
}

struct AppMockIntentStream {
    _rx: UnboundedReceiver<OrderIntent>,
    // requeue path back into the same channel, weak so the consumer
    // side never keeps the channel alive on its own
    _tx: WeakUnboundedSender<OrderIntent>,
    _num_acked: Arc<AtomicU32>,
}

struct AppMockIntentDelivery {
    _intent: OrderIntent,
    _tx: WeakUnboundedSender<OrderIntent>,
    _num_acked: Arc<AtomicU32>,
}

impl Default for AppMockIntentQueue {
    fn default() -> Self {
        Self::build()
    }
}

impl AppMockIntentQueue {
    pub fn build() -> Self {
        let (_tx, rx) = mpsc::unbounded_channel();
        Self {
            _tx,
            _rx: Mutex::new(Some(rx)),
            _num_acked: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn num_acked(&self) -> u32 {
        self._num_acked.load(Ordering::Relaxed)
    }

    /// counter handle surviving the move into a trait object
    pub fn ack_counter(&self) -> Arc<AtomicU32> {
        self._num_acked.clone()
    }
}

#[async_trait]
impl AbstractIntentQueue for AppMockIntentQueue {
    async fn publish(&self, intent: OrderIntent) -> Result<(), AppQueueError> {
        self._tx.send(intent).map_err(|e| AppQueueError {
            fn_label: AppQueueErrorFnLabel::Publish,
            reason: AppQueueErrorReason::InternalConfig(e.to_string()),
        })
    }

    async fn subscribe(&self) -> Result<Box<dyn AbstractIntentStream>, AppQueueError> {
        let mut guard = self._rx.lock().await;
        let rx = guard.take().ok_or(AppQueueError {
            fn_label: AppQueueErrorFnLabel::Subscribe,
            reason: AppQueueErrorReason::InternalConfig("mock-single-subscriber".to_string()),
        })?;
        let obj = AppMockIntentStream {
            _rx: rx,
            _tx: self._tx.downgrade(),
            _num_acked: self._num_acked.clone(),
        };
        Ok(Box::new(obj))
    }
} // end of impl AppMockIntentQueue

#[async_trait]
impl AbstractIntentStream for AppMockIntentStream {
    async fn receive(&mut self) -> Result<Box<dyn AbstractIntentDelivery>, AppQueueError> {
        let intent = self._rx.recv().await.ok_or(AppQueueError {
            fn_label: AppQueueErrorFnLabel::Receive,
            reason: AppQueueErrorReason::ConsumerEnd,
        })?;
        let obj = AppMockIntentDelivery {
            _intent: intent,
            _tx: self._tx.clone(),
            _num_acked: self._num_acked.clone(),
        };
        Ok(Box::new(obj))
    }
}

#[async_trait]
impl AbstractIntentDelivery for AppMockIntentDelivery {
    fn intent(&self) -> &OrderIntent {
        &self._intent
    }

    async fn ack(&mut self) -> Result<(), AppQueueError> {
        let _prev = self._num_acked.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn nack(&mut self) -> Result<(), AppQueueError> {
        let tx = self._tx.upgrade().ok_or(AppQueueError {
            fn_label: AppQueueErrorFnLabel::Nack,
            reason: AppQueueErrorReason::ConsumerEnd,
        })?;
        tx.send(self._intent.clone()).map_err(|e| AppQueueError {
            fn_label: AppQueueErrorFnLabel::Nack,
            reason: AppQueueErrorReason::InternalConfig(e.to_string()),
        })
    }
}
