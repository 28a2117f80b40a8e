use std::boxed::Box;
use std::result::Result;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, Utc};
use deadpool_lapin::{Config as DeadpConfig, Pool, PoolConfig, Runtime, Timeouts as DeadpTimeouts};
use futures_util::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions,
    ConfirmSelectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
};
use lapin::protocol::basic::AMQPProperties;
use lapin::publisher_confirm::Confirmation;
use lapin::topology::TopologyDefinition;
use lapin::types::FieldTable;
use lapin::{Channel, ConnectionProperties, Consumer, Error as LapinError, ExchangeKind};
use serde::Deserialize;

use super::{
    AbstractIntentDelivery, AbstractIntentQueue, AbstractIntentStream, AppQueueError,
    AppQueueErrorFnLabel, AppQueueErrorReason,
};
use crate::config::{AppAmqpBindingCfg, AppAmqpQueueCfg};
use crate::confidentiality::AbstractConfidentiality;
use crate::constant::app_meta;
use crate::logging::{app_log_event, AppLogContext, AppLogLevel};
use crate::model::OrderIntent;

#[allow(clippy::upper_case_acronyms)]
#[derive(Deserialize)]
struct SECRET {
    host: String,
    port: u16,
    username: String,
    password: String,
}

impl From<LapinError> for AppQueueErrorReason {
    fn from(value: LapinError) -> Self {
        match value {
            LapinError::IOError(ioe) => Self::SysIo(ioe.kind(), ioe.to_string()),
            LapinError::ParsingError(e) => Self::CorruptedPayload(e.to_string()),
            LapinError::SerialisationError(e) => Self::CorruptedPayload(e.to_string()),
            LapinError::ChannelsLimitReached => Self::InternalConfig("channel-limit".to_string()),
            LapinError::InvalidChannel(num) => {
                Self::InternalConfig(format!("invalid-channel: {num}"))
            }
            LapinError::InvalidConnectionState(state) => {
                Self::LowLevelConn(format!("conn-state: {:?}", state))
            }
            LapinError::InvalidChannelState(state) => {
                Self::LowLevelConn(format!("channel-state: {:?}", state))
            }
            LapinError::ProtocolError(e) => Self::LowLevelConn(e.to_string()),
            LapinError::MissingHeartbeatError => {
                Self::LowLevelConn("amqp-no-heartbeat".to_string())
            }
            LapinError::InvalidProtocolVersion(ver) => {
                Self::LowLevelConn(format!("amqp-version: {ver}"))
            }
            _ => Self::NotSupport,
        }
    }
} // end of AppQueueErrorReason

fn generate_consumer_tag(label: &str) -> String {
    let thread_id = std::thread::current().id();
    let (timefmt, nsecs) = {
        let now = Local::now().fixed_offset();
        (now.to_rfc3339(), now.timestamp_subsec_nanos())
    };
    format!("{}-{:?}-{}-{}", label, thread_id, timefmt, nsecs)
}

pub(super) struct AppAmqpIntentQueue {
    _logctx: Arc<AppLogContext>,
    _pool: Pool,
    _binding_cfg: Arc<AppAmqpBindingCfg>,
}

struct AppAmqpIntentStream {
    _logctx: Arc<AppLogContext>,
    _consumer: Consumer,
}

struct AppAmqpIntentDelivery {
    _intent: OrderIntent,
    _inner: Delivery,
}

impl AppAmqpIntentQueue {
    pub(super) fn try_build(
        app_cfg: &AppAmqpQueueCfg,
        cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
        _logctx: Arc<AppLogContext>,
    ) -> Result<Self, AppQueueError> {
        let uri = Self::_setup_broker_uri(app_cfg, cfdntl)?;
        let cfg = Self::_setup_lapin_config(app_cfg, uri);
        let _pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Self::_map_err_init(AppQueueErrorReason::LowLevelConn(e.to_string())))?;
        Ok(Self {
            _logctx,
            _pool,
            _binding_cfg: app_cfg.binding.clone(),
        })
    }

    /// Note, `deadpool-lapin` does not apply `lapin::uri::AMQPUri` re-exported
    /// from crate `amq_protocol_uri` to pool configuration, the only way of specifying
    /// URI is to format these element to string in adcvance
    fn _setup_broker_uri(
        app_cfg: &AppAmqpQueueCfg,
        cfdntl: Arc<Box<dyn AbstractConfidentiality>>,
    ) -> Result<String, AppQueueError> {
        let confidential_path = app_cfg.confidential_id.as_str();
        let serial = cfdntl
            .try_get_payload(confidential_path)
            .map_err(|_e| Self::_map_err_init(AppQueueErrorReason::InvalidCredential))?;
        let secret = serde_json::from_str::<SECRET>(serial.as_str())
            .map_err(|_e| Self::_map_err_init(AppQueueErrorReason::CorruptedCredential))?;
        let out = format!(
            "amqp://{}:{}@{}:{}/{}?channel_max={}&heartbeat={}",
            secret.username,
            secret.password,
            secret.host,
            secret.port,
            app_cfg.attributes.vhost.as_str(),
            app_cfg.attributes.max_channels,
            app_cfg.attributes.timeout_secs,
        );
        Ok(out)
    }

    fn _setup_lapin_config(app_cfg: &AppAmqpQueueCfg, uri: String) -> DeadpConfig {
        let timeout_secs = (app_cfg.attributes.timeout_secs as u64) << 2;
        let timeouts = DeadpTimeouts {
            wait: Some(std::time::Duration::new(timeout_secs, 0)),
            create: Some(std::time::Duration::new(timeout_secs, 0)),
            recycle: None,
        };
        let mut poolcfg = PoolConfig::new(app_cfg.max_connections as usize);
        poolcfg.timeouts = timeouts;
        DeadpConfig {
            connection_properties: ConnectionProperties::default(),
            url: Some(uri),
            pool: Some(poolcfg),
        }
    }

    async fn _acquire_channel(
        &self,
        fn_label: AppQueueErrorFnLabel,
    ) -> Result<Channel, AppQueueError> {
        let conn = self._pool.get().await.map_err(|e| AppQueueError {
            fn_label,
            reason: AppQueueErrorReason::LowLevelConn(e.to_string()),
        })?;
        let chn = conn
            .create_channel()
            .await
            .map_err(|e| Self::_map_err(fn_label, e.into()))?;
        chn.confirm_select(ConfirmSelectOptions { nowait: false })
            .await // do confirm every time when channel is open
            .map_err(|e| Self::_map_err(fn_label, e.into()))?;
        let declare_history = conn.topology();
        self.ensure_intentq(&declare_history, fn_label, chn.clone())
            .await?;
        Ok(chn)
    }

    /// declare the exchange / queue pair and bind them, skipped when
    /// the connection already did so on an earlier channel
    async fn ensure_intentq(
        &self,
        declare_history: &TopologyDefinition,
        fn_label: AppQueueErrorFnLabel,
        chn: Channel,
    ) -> Result<(), AppQueueError> {
        let cfg = self._binding_cfg.as_ref();
        let seen = declare_history
            .queues
            .iter()
            .any(|q| q.name.as_str() == cfg.queue.as_str());
        if seen {
            return Ok(());
        }
        let logctx = self._logctx.as_ref();
        app_log_event!(logctx, AppLogLevel::DEBUG, "declare-q: {}", cfg.queue);
        let ex_options = ExchangeDeclareOptions {
            passive: false,
            durable: cfg.durable,
            auto_delete: false,
            internal: false,
            nowait: false,
        };
        chn.exchange_declare(
            cfg.exchange.as_str(),
            ExchangeKind::Direct,
            ex_options,
            FieldTable::default(),
        )
        .await
        .map_err(|e| Self::_map_err(fn_label, e.into()))?;
        let q_options = QueueDeclareOptions {
            passive: false,
            durable: cfg.durable,
            exclusive: false,
            auto_delete: false,
            nowait: false,
        };
        let ttl_millis = cfg.ttl_secs as i32 * 1000;
        let mut args = FieldTable::default();
        args.insert("x-message-ttl".into(), ttl_millis.into());
        args.insert("x-max-length".into(), (cfg.max_length as i32).into());
        let _q = chn
            .queue_declare(cfg.queue.as_str(), q_options, args)
            .await
            .map_err(|e| Self::_map_err(fn_label, e.into()))?;
        chn.queue_bind(
            cfg.queue.as_str(),
            cfg.exchange.as_str(),
            cfg.routing_key.as_str(),
            QueueBindOptions::default(),
            FieldTable::default(),
        )
        .await
        .map_err(|e| Self::_map_err(fn_label, e.into()))?;
        Ok(())
    } // end of fn ensure_intentq

    fn convert_confirm_to_error(value: Confirmation) -> Result<(), AppQueueErrorReason> {
        let detail = match value {
            Confirmation::NotRequested => {
                // implicitly mean `confirm-select` does not take effect
                Some("amqp-confirm-failure".to_string())
            }
            Confirmation::Nack(_msg) => Some("amqp-unexpected-nack".to_string()),
            Confirmation::Ack(msg) => msg.map(|r| {
                format!(
                    "acker: {:?}, reply-code: {:?}, reply-detail: {:?}",
                    r.acker, r.reply_code, r.reply_text
                )
            }),
        };
        detail.map_or_else(|| Ok(()), |d| Err(AppQueueErrorReason::PublishConfirm(d)))
    }

    fn _map_err_init(reason: AppQueueErrorReason) -> AppQueueError {
        AppQueueError {
            fn_label: AppQueueErrorFnLabel::InitCtx,
            reason,
        }
    }
    fn _map_err(fn_label: AppQueueErrorFnLabel, reason: AppQueueErrorReason) -> AppQueueError {
        AppQueueError { fn_label, reason }
    }
} // end of impl AppAmqpIntentQueue

#[async_trait]
impl AbstractIntentQueue for AppAmqpIntentQueue {
    async fn publish(&self, intent: OrderIntent) -> Result<(), AppQueueError> {
        let fn_label = AppQueueErrorFnLabel::Publish;
        let chn = self._acquire_channel(fn_label).await?;
        let cfg = self._binding_cfg.as_ref();
        let message = serde_json::to_vec(&intent).map_err(|e| {
            Self::_map_err(fn_label, AppQueueErrorReason::CorruptedPayload(e.to_string()))
        })?;
        let now = Utc::now();
        let properties = AMQPProperties::default()
            .with_app_id(app_meta::LABAL.into())
            .with_content_encoding("utf-8".into())
            .with_content_type("application/json".into())
            .with_delivery_mode(if cfg.durable { 2 } else { 1 })
            .with_timestamp(now.timestamp() as u64);
        // To create a responsive application, message broker has to return
        // unroutable message whenever the given routing key goes wrong.
        let confirm = chn
            .basic_publish(
                cfg.exchange.as_str(),
                cfg.routing_key.as_str(),
                BasicPublishOptions {
                    mandatory: true,
                    immediate: false,
                },
                &message,
                properties,
            )
            .await
            .map_err(|e| Self::_map_err(fn_label, e.into()))?
            .await
            .map_err(|e| Self::_map_err(fn_label, e.into()))?;
        let logctx = self._logctx.as_ref();
        app_log_event!(logctx, AppLogLevel::DEBUG, "publish-confirm: {:?}", confirm);
        Self::convert_confirm_to_error(confirm).map_err(|r| Self::_map_err(fn_label, r))
    } // end of fn publish

    async fn subscribe(&self) -> Result<Box<dyn AbstractIntentStream>, AppQueueError> {
        let fn_label = AppQueueErrorFnLabel::Subscribe;
        let chn = self._acquire_channel(fn_label).await?;
        let qname = self._binding_cfg.queue.as_str();
        let options = BasicConsumeOptions {
            no_local: false,
            no_ack: false,
            exclusive: false,
            nowait: false,
        };
        let _consumer = chn
            .basic_consume(
                qname,
                generate_consumer_tag(qname).as_str(),
                options,
                FieldTable::default(),
            )
            .await
            .map_err(|e| Self::_map_err(fn_label, e.into()))?;
        let obj = AppAmqpIntentStream {
            _logctx: self._logctx.clone(),
            _consumer,
        };
        Ok(Box::new(obj))
    }
} // end of impl AbstractIntentQueue

#[async_trait]
impl AbstractIntentStream for AppAmqpIntentStream {
    async fn receive(&mut self) -> Result<Box<dyn AbstractIntentDelivery>, AppQueueError> {
        let fn_label = AppQueueErrorFnLabel::Receive;
        let delivered = match self._consumer.next().await {
            Some(Ok(d)) => d,
            Some(Err(e)) => {
                return Err(AppQueueError {
                    fn_label,
                    reason: e.into(),
                })
            }
            None => {
                return Err(AppQueueError {
                    fn_label,
                    reason: AppQueueErrorReason::ConsumerEnd,
                })
            }
        };
        match serde_json::from_slice::<OrderIntent>(delivered.data.as_slice()) {
            Ok(intent) => Ok(Box::new(AppAmqpIntentDelivery {
                _intent: intent,
                _inner: delivered,
            })),
            Err(e) => {
                let logctx = self._logctx.as_ref();
                app_log_event!(logctx, AppLogLevel::ERROR, "malformed-intent: {}", e);
                // discard instead of requeueing, a malformed payload
                // can never become decodable on redelivery
                delivered
                    .acker
                    .ack(BasicAckOptions::default())
                    .await
                    .map_err(|ae| AppQueueError {
                        fn_label,
                        reason: ae.into(),
                    })?;
                Err(AppQueueError {
                    fn_label,
                    reason: AppQueueErrorReason::CorruptedPayload(e.to_string()),
                })
            }
        }
    } // end of fn receive
} // end of impl AppAmqpIntentStream

#[async_trait]
impl AbstractIntentDelivery for AppAmqpIntentDelivery {
    fn intent(&self) -> &OrderIntent {
        &self._intent
    }

    async fn ack(&mut self) -> Result<(), AppQueueError> {
        self._inner
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map_err(|e| AppQueueError {
                fn_label: AppQueueErrorFnLabel::Ack,
                reason: e.into(),
            })
    }

    async fn nack(&mut self) -> Result<(), AppQueueError> {
        let options = BasicNackOptions {
            multiple: false,
            requeue: true,
        };
        self._inner
            .acker
            .nack(options)
            .await
            .map_err(|e| AppQueueError {
                fn_label: AppQueueErrorFnLabel::Nack,
                reason: e.into(),
            })
    }
} // end of impl AppAmqpIntentDelivery
