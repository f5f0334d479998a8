use derive_more::{Display, Error};

#[derive(Debug, Display, Error)]
pub enum ConfigError {
    #[display("failed to read config file")]
    ReadFile,
    #[display("failed to parse config: {reason}")]
    Parse { reason: String },
    #[display("invalid config: {field}")]
    Validation { field: String },
}

#[derive(Debug, Display, Error)]
pub enum SeriesError {
    #[display("series is empty")]
    Empty,
    #[display("series is not strictly increasing by time at index {index}")]
    Unsorted { index: usize },
}

#[derive(Debug, Display, Error)]
pub enum IndicatorError {
    #[display("invalid parameter: {name}")]
    InvalidParameter { name: String },
}

#[derive(Debug, Display, Error)]
pub enum AggregateError {
    #[display(
        "bucket width {target_secs}s is not a positive multiple of the source bar width {source_secs}s"
    )]
    InvalidBucketWidth { source_secs: i64, target_secs: i64 },
}

#[derive(Debug, Display, Error)]
pub enum StorageError {
    #[display("database migration failed")]
    Migration,
    #[display("failed to read from {table}")]
    Read { table: String },
    #[display("failed to write to {table}")]
    Write { table: String },
    #[display("batch covering rows {first_row}..={last_row} failed for {table}")]
    Batch {
        table: String,
        first_row: usize,
        last_row: usize,
    },
}

#[derive(Debug, Display, Error)]
pub enum PipelineError {
    #[display("failed to read source rows")]
    Source,
    #[display("source rows do not form a valid series")]
    Series,
    #[display("aggregation stage failed")]
    Aggregate,
    #[display("failed to write target rows")]
    Sink,
}
