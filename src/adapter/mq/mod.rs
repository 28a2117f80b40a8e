mod amqp;
mod mock;

use std::boxed::Box;
use std::marker::{Send, Sync};
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;

use amqp::AppAmqpIntentQueue;

use crate::config::AppQueueCfg;
use crate::confidentiality::AbstractConfidentiality;
use crate::logging::AppLogContext;
use crate::model::OrderIntent;

pub use mock::AppMockIntentQueue;

#[derive(Debug, Clone, Copy)]
pub enum AppQueueErrorFnLabel {
    InitCtx,
    Publish,
    Subscribe,
    Receive,
    Ack,
    Nack,
}

#[derive(Debug)]
pub enum AppQueueErrorReason {
    NotSupport,
    InvalidCredential,
    CorruptedCredential,
    SysIo(std::io::ErrorKind, String),
    LowLevelConn(String),
    InternalConfig(String),
    CorruptedPayload(String),
    PublishConfirm(String),
    // the broker closed the consumer stream, callers should tear down
    // and resubscribe
    ConsumerEnd,
}

#[derive(Debug)]
pub struct AppQueueError {
    pub fn_label: AppQueueErrorFnLabel,
    pub reason: AppQueueErrorReason,
}

// Note:
// As of rust v1.75 , the language does not support async trait method
// which returns `dyn Trait` type , so I still use crate `async-trait` at here

/// durable hand-off of granted reservations between the admission
/// path and fulfillment workers, delivery is at-least-once
#[async_trait]
pub trait AbstractIntentQueue: Sync + Send {
    async fn publish(&self, intent: OrderIntent) -> Result<(), AppQueueError>;
    async fn subscribe(&self) -> Result<Box<dyn AbstractIntentStream>, AppQueueError>;
}

#[async_trait]
pub trait AbstractIntentStream: Send {
    async fn receive(&mut self) -> Result<Box<dyn AbstractIntentDelivery>, AppQueueError>;
}

#[async_trait]
pub trait AbstractIntentDelivery: Send {
    fn intent(&self) -> &OrderIntent;
    /// confirm a final verdict, the broker drops the message for good
    async fn ack(&mut self) -> Result<(), AppQueueError>;
    /// hand the message back for redelivery, used when fulfillment
    /// aborted before reaching a verdict
    async fn nack(&mut self) -> Result<(), AppQueueError>;
}

pub fn build_context(
    cfg: &AppQueueCfg,
    cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
    logctx: Arc<AppLogContext>,
) -> Result<Box<dyn AbstractIntentQueue>, AppQueueError> {
    match cfg {
        AppQueueCfg::Mock => Ok(Box::new(AppMockIntentQueue::build())),
        AppQueueCfg::AMQP(c) => {
            let obj = AppAmqpIntentQueue::try_build(c, cfdntl, logctx)?;
            Ok(Box::new(obj))
        }
    }
}
