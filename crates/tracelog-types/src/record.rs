use std::fmt;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// UTC timestamp carried by every trace record.
///
/// Stores accept millisecond resolution only, so every timestamp produced
/// by this crate is truncated to whole milliseconds.
pub type TraceTime = DateTime<Utc>;

/// Owner marker reserved for reader bootstrap records.
///
/// Records carrying this owner are written by readers to keep a tailing
/// cursor alive and are never handed to consumers.
pub const SENTINEL_OWNER: &str = "$tracelog.sentinel";

/// Method name used by sentinel records.
pub const SENTINEL_METHOD: &str = "anchor";

/// Current wall-clock time truncated to milliseconds.
pub fn now() -> TraceTime {
    Utc::now().trunc_subsecs(3)
}

/// Build a [`TraceTime`] from milliseconds since the UNIX epoch.
pub fn time_from_millis(ms: i64) -> Option<TraceTime> {
    DateTime::<Utc>::from_timestamp_millis(ms)
}

/// Convert an emission argument into its JSON form.
///
/// Never fails: values that cannot be represented as JSON (for example maps
/// with non-string keys) are replaced by a descriptive string.
pub fn to_arg<T: Serialize + ?Sized>(value: &T) -> Value {
    serde_json::to_value(value)
        .unwrap_or_else(|e| Value::String(format!("<unserializable: {e}>")))
}

/// Total order of persisted records.
///
/// Ordering: `time` → `serial`. Records that share a millisecond are
/// disambiguated by the serial assigned when they were persisted.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Record timestamp.
    pub time: TraceTime,
    /// Tie-breaker among records sharing `time`.
    pub serial: u64,
}

impl Position {
    pub fn new(time: TraceTime, serial: u64) -> Self {
        Self { time, serial }
    }
}

impl PartialOrd for Position {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Position {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.time
            .cmp(&other.time)
            .then(self.serial.cmp(&other.serial))
    }
}

impl fmt::Debug for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Position({}ms#{})",
            self.time.timestamp_millis(),
            self.serial
        )
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.time.to_rfc3339(), self.serial)
    }
}

/// One captured event.
///
/// A record is built once, either by an emitter (with `serial == 0`) or by
/// the durable log writer which re-stamps it with a serial, and is never
/// mutated afterwards.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    /// When the event was emitted.
    pub time: TraceTime,
    /// Component that owns the emitting tracer.
    pub owner: String,
    /// Name of the tracer interface the event belongs to.
    pub interface: String,
    /// Event method name within the interface.
    pub method: String,
    /// Ordered event arguments.
    #[serde(default)]
    pub args: Vec<Value>,
    /// Persistence tie-breaker; zero until the record is written.
    #[serde(default)]
    pub serial: u64,
}

impl TraceRecord {
    /// Build a record stamped with the current time.
    pub fn new(
        owner: impl Into<String>,
        interface: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self::at(now(), owner, interface, method, args)
    }

    /// Build a record with an explicit timestamp.
    pub fn at(
        time: TraceTime,
        owner: impl Into<String>,
        interface: impl Into<String>,
        method: impl Into<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            time: time.trunc_subsecs(3),
            owner: owner.into(),
            interface: interface.into(),
            method: method.into(),
            args,
            serial: 0,
        }
    }

    /// Bootstrap record placed at `time` to keep a tailing cursor open.
    pub fn sentinel(time: TraceTime) -> Self {
        Self::at(time, SENTINEL_OWNER, SENTINEL_OWNER, SENTINEL_METHOD, Vec::new())
    }

    /// Returns `true` for reader bootstrap records.
    pub fn is_sentinel(&self) -> bool {
        self.owner == SENTINEL_OWNER
    }

    /// Copy of this record carrying the given persistence serial.
    pub fn with_serial(&self, serial: u64) -> Self {
        Self {
            serial,
            ..self.clone()
        }
    }

    /// Position of this record in the persisted order.
    pub fn position(&self) -> Position {
        Position::new(self.time, self.serial)
    }
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} {}.{}(",
            self.time.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.owner,
            self.interface,
            self.method
        )?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{arg}")?;
        }
        write!(f, ")")
    }
}
