//! Core domain model and persistence layer for the hookline webhook broker.
//!
//! Provides the aggregate types (channels, producers, consumers, messages,
//! delivery jobs), the transactional repository layer that persists them,
//! and the error taxonomy shared by the dispatcher and the HTTP surface.
//! Everything durable lives in PostgreSQL; the broker holds no state that
//! must survive only in memory.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod db;
pub mod error;
pub mod models;
pub mod pagination;
pub mod storage;

pub use db::{Db, Session};
pub use error::{CoreError, Result};
pub use models::{
    App, AppStatus, Channel, ChannelId, Consumer, ConsumerId, ConsumerType, DeliveryJob, JobId,
    JobStatus, Message, MessageId, MessageStatus, Producer, ProducerId,
};
pub use pagination::{Cursor, Paginateable, Pagination, PAGE_SIZE};
