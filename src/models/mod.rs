// Domain models: persisted snapshots and derived usage views

mod aggregation;
mod gpu;

pub use aggregation::{
    FlatReading, IdlePod, MemoryUsageAverage, TrendPoint, UsageAggregate, UsageTable, UserOrder,
    UserTotals,
};
pub use gpu::{
    GpuPod, GpuReading, PodSnapshot, TIMESTAMP_FORMAT, local_now, option_timestamp_format,
    timestamp_format,
};
