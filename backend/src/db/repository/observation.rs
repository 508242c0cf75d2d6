//! Read access to the sensor stream tables.
//!
//! Every identifier reaching an implementation is already one of the closed
//! enumerations in [`crate::models::observation`]; implementations never see
//! caller-supplied table or column names.

use async_trait::async_trait;
use chrono::NaiveDateTime;

use super::error::RepositoryResult;
use crate::models::{
    AlignmentKey, BucketPresence, Field, FieldAverages, MergedRecord, ObservationRecord,
    StreamTable, TimeRange, Variant,
};
use crate::services::buckets::TimeBuckets;

/// Repository trait for observation queries.
///
/// # Thread Safety
/// Implementations must be `Send + Sync` to work with async Rust.
#[async_trait]
pub trait ObservationRepository: Send + Sync {
    /// Check if the backing store is reachable.
    async fn health_check(&self) -> RepositoryResult<bool>;

    /// Rows of one table within `range`, ascending by timestamp.
    ///
    /// When `station_id` is given only that station's rows are returned.
    async fn fetch_stream(
        &self,
        table: StreamTable,
        range: TimeRange,
        station_id: Option<&str>,
    ) -> RepositoryResult<Vec<ObservationRecord>>;

    /// The row with the greatest timestamp in the table's whole history.
    async fn fetch_latest(&self, table: StreamTable) -> RepositoryResult<Option<ObservationRecord>>;

    /// Greatest timestamp of the table within `range`.
    async fn last_timestamp(
        &self,
        table: StreamTable,
        range: TimeRange,
    ) -> RepositoryResult<Option<NaiveDateTime>>;

    /// Full outer combination of the four streams of `variant`, restricted to
    /// rows whose coalesced timestamp falls in `range`, ascending.
    async fn fetch_merged(
        &self,
        variant: Variant,
        range: TimeRange,
        key: AlignmentKey,
    ) -> RepositoryResult<Vec<MergedRecord>>;

    /// Hourly means of `fields` over one table.
    ///
    /// Groups are ascending by hour; `station_id` only filters rows.
    async fn hourly_averages(
        &self,
        table: StreamTable,
        fields: &[Field],
        range: TimeRange,
        station_id: Option<&str>,
    ) -> RepositoryResult<Vec<FieldAverages>>;

    /// Day-relative 6-hour means of every tracked field over merged data,
    /// grouped per period and station.
    async fn six_hour_averages(
        &self,
        variant: Variant,
        range: TimeRange,
        key: AlignmentKey,
    ) -> RepositoryResult<Vec<FieldAverages>>;

    /// Presence counts of merged data per bucket, one entry per bucket in
    /// bucket order.
    async fn bucket_presence(
        &self,
        variant: Variant,
        buckets: &TimeBuckets,
        key: AlignmentKey,
    ) -> RepositoryResult<Vec<BucketPresence>>;
}
