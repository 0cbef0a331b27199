//! Trade and context sources: SQLite database, HTTP API, or CSV file.
//!
//! Every source returns closed trades ordered by entry time. Rows that
//! cannot be parsed are logged and skipped; only I/O, connectivity and
//! schema failures are errors. Context is optional everywhere; a source
//! without context yields an empty store.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use edgeproof_core::{AssetClass, ContextData, ContextStore, Direction, RegimeSnapshot, TradeRecord};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source not configured: {0}")]
    NotConfigured(&'static str),

    #[error("read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    HttpStatus { url: String, status: u16 },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("row {row}: {reason}")]
    InvalidRow { row: usize, reason: String },
}

/// `[source]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub db_path: Option<PathBuf>,
    pub api_url: Option<String>,
    pub api_timeout_secs: u64,
    pub csv_path: Option<PathBuf>,
    /// JSON context file accompanying the CSV trades.
    pub context_path: Option<PathBuf>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            api_url: None,
            api_timeout_secs: 30,
            csv_path: None,
            context_path: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Database if configured, then API, then CSV.
    #[default]
    Auto,
    Db,
    Api,
    Csv,
}

pub trait TradeSource {
    fn name(&self) -> &'static str;

    /// Closed trades ordered by entry time.
    fn fetch_trades(&self) -> Result<Vec<TradeRecord>, SourceError>;

    fn fetch_context(&self) -> Result<ContextStore, SourceError>;
}

/// Build the source for `kind` from configuration.
pub fn open_source(kind: SourceKind, config: &SourceConfig) -> Result<Box<dyn TradeSource>, SourceError> {
    let kind = match kind {
        SourceKind::Auto if config.db_path.is_some() => SourceKind::Db,
        SourceKind::Auto if config.api_url.is_some() => SourceKind::Api,
        SourceKind::Auto if config.csv_path.is_some() => SourceKind::Csv,
        SourceKind::Auto => return Err(SourceError::NotConfigured("no db_path, api_url or csv_path set")),
        other => other,
    };
    let source: Box<dyn TradeSource> = match kind {
        SourceKind::Db => {
            let path = config
                .db_path
                .clone()
                .ok_or(SourceError::NotConfigured("source.db_path"))?;
            Box::new(SqliteSource::new(path))
        }
        SourceKind::Api => {
            let url = config
                .api_url
                .clone()
                .ok_or(SourceError::NotConfigured("source.api_url"))?;
            Box::new(ApiSource::new(url, Duration::from_secs(config.api_timeout_secs))?)
        }
        SourceKind::Csv | SourceKind::Auto => {
            let path = config
                .csv_path
                .clone()
                .ok_or(SourceError::NotConfigured("source.csv_path"))?;
            Box::new(CsvSource::new(path, config.context_path.clone()))
        }
    };
    info!(source = source.name(), "trade source selected");
    Ok(source)
}

fn parse_time(row: usize, field: &str, raw: &str) -> Result<DateTime<Utc>, SourceError> {
    DateTime::parse_from_rfc3339(raw.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SourceError::InvalidRow {
            row,
            reason: format!("{field} {raw:?}: {e}"),
        })
}

fn parse_date(row: usize, raw: &str) -> Result<NaiveDate, SourceError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| SourceError::InvalidRow {
        row,
        reason: format!("date {raw:?}: {e}"),
    })
}

fn parse_direction(row: usize, raw: &str) -> Result<Direction, SourceError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "long" | "buy" => Ok(Direction::Long),
        "short" | "sell" => Ok(Direction::Short),
        other => Err(SourceError::InvalidRow {
            row,
            reason: format!("unknown direction {other:?}"),
        }),
    }
}

fn sort_by_entry(mut trades: Vec<TradeRecord>) -> Vec<TradeRecord> {
    trades.sort_by_key(|t| t.entry_time);
    trades
}

/// Collect parsed rows, skipping `InvalidRow` failures with a warning.
/// Any other error aborts the fetch.
fn keep_valid_rows(
    source: &'static str,
    rows: impl IntoIterator<Item = Result<TradeRecord, SourceError>>,
) -> Result<Vec<TradeRecord>, SourceError> {
    let mut trades = Vec::new();
    let mut skipped = 0usize;
    for row in rows {
        match row {
            Ok(trade) => trades.push(trade),
            Err(SourceError::InvalidRow { row, reason }) => {
                skipped += 1;
                warn!(source, row, %reason, "skipping malformed trade row");
            }
            Err(e) => return Err(e),
        }
    }
    if skipped > 0 {
        warn!(source, skipped, kept = trades.len(), "malformed trade rows skipped");
    }
    Ok(trades)
}

// ─── SQLite ──────────────────────────────────────────────────────────

/// Table layout read by [`SqliteSource`]. Timestamps are RFC 3339 text,
/// dates are `YYYY-MM-DD`; open trades have a NULL `exit_time`.
pub const SQLITE_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS trades (
    algorithm       TEXT NOT NULL,
    symbol          TEXT NOT NULL,
    asset_class     TEXT NOT NULL,
    direction       TEXT NOT NULL,
    entry_time      TEXT NOT NULL,
    exit_time       TEXT,
    return_pct      REAL,
    position_size   REAL NOT NULL,
    signal_strength REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS regime_snapshots (
    date                  TEXT PRIMARY KEY,
    vix                   REAL NOT NULL,
    regime_score          REAL NOT NULL,
    trend_strength        REAL NOT NULL,
    breadth               REAL NOT NULL,
    volatility_percentile REAL NOT NULL
);
CREATE TABLE IF NOT EXISTS signal_counts (
    date      TEXT NOT NULL,
    algorithm TEXT NOT NULL,
    count     INTEGER NOT NULL
);
";

pub struct SqliteSource {
    db_path: PathBuf,
}

struct RawTradeRow {
    algorithm: String,
    symbol: String,
    asset_class: String,
    direction: String,
    entry_time: String,
    exit_time: String,
    return_pct: f64,
    position_size: f64,
    signal_strength: f64,
}

impl RawTradeRow {
    fn into_trade(self, row: usize) -> Result<TradeRecord, SourceError> {
        Ok(TradeRecord {
            direction: parse_direction(row, &self.direction)?,
            entry_time: parse_time(row, "entry_time", &self.entry_time)?,
            exit_time: parse_time(row, "exit_time", &self.exit_time)?,
            asset_class: AssetClass::from_label(&self.asset_class),
            algorithm: self.algorithm,
            symbol: self.symbol,
            return_pct: self.return_pct,
            position_size: self.position_size,
            signal_strength: self.signal_strength,
        })
    }
}

impl SqliteSource {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self { db_path: db_path.into() }
    }

    fn open(&self) -> Result<Connection, SourceError> {
        if !self.db_path.exists() {
            return Err(SourceError::Io {
                path: self.db_path.clone(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "database file not found"),
            });
        }
        Ok(Connection::open(&self.db_path)?)
    }
}

impl TradeSource for SqliteSource {
    fn name(&self) -> &'static str {
        "db"
    }

    fn fetch_trades(&self) -> Result<Vec<TradeRecord>, SourceError> {
        let conn = self.open()?;
        let mut stmt = conn.prepare(
            "SELECT algorithm, symbol, asset_class, direction, entry_time, exit_time,
                    return_pct, position_size, signal_strength
             FROM trades
             WHERE exit_time IS NOT NULL AND return_pct IS NOT NULL
             ORDER BY entry_time",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(RawTradeRow {
                algorithm: row.get(0)?,
                symbol: row.get(1)?,
                asset_class: row.get(2)?,
                direction: row.get(3)?,
                entry_time: row.get(4)?,
                exit_time: row.get(5)?,
                return_pct: row.get(6)?,
                position_size: row.get(7)?,
                signal_strength: row.get(8)?,
            })
        })?;

        let parsed = rows.enumerate().map(|(i, row)| match row {
            Ok(r) => r.into_trade(i),
            Err(e @ (rusqlite::Error::InvalidColumnType(..) | rusqlite::Error::FromSqlConversionFailure(..))) => {
                Err(SourceError::InvalidRow {
                    row: i,
                    reason: e.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        });
        let trades = keep_valid_rows(self.name(), parsed)?;
        debug!(trades = trades.len(), path = %self.db_path.display(), "trades loaded from database");
        Ok(sort_by_entry(trades))
    }

    fn fetch_context(&self) -> Result<ContextStore, SourceError> {
        let conn = self.open()?;
        let mut store = ContextStore::new();

        let mut stmt = conn.prepare(
            "SELECT date, vix, regime_score, trend_strength, breadth, volatility_percentile
             FROM regime_snapshots ORDER BY date",
        )?;
        let regimes = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, f64>(5)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (i, (date, vix, regime_score, trend_strength, breadth, volatility_percentile)) in
            regimes.into_iter().enumerate()
        {
            store.insert_regime(RegimeSnapshot {
                date: parse_date(i, &date)?,
                vix,
                regime_score,
                trend_strength,
                breadth,
                volatility_percentile,
            });
        }

        let mut stmt = conn.prepare("SELECT date, algorithm, count FROM signal_counts")?;
        let counts = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        for (i, (date, algorithm, count)) in counts.into_iter().enumerate() {
            let count = u32::try_from(count).map_err(|_| SourceError::InvalidRow {
                row: i,
                reason: format!("signal count {count} out of range"),
            })?;
            store.insert_signal_count(&algorithm, parse_date(i, &date)?, count);
        }
        debug!(regimes = store.regime_count(), "context loaded from database");
        Ok(store)
    }
}

// ─── HTTP API ────────────────────────────────────────────────────────

/// JSON API exposing `GET {base}/trades` and `GET {base}/context`.
pub struct ApiSource {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl ApiSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, SourceError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("edgeproof/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    fn get(&self, path: &str) -> Result<Option<reqwest::blocking::Response>, SourceError> {
        let url = format!("{}/{path}", self.base_url);
        let resp = self.client.get(&url).send()?;
        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            debug!(url, "endpoint not found");
            return Ok(None);
        }
        if !status.is_success() {
            return Err(SourceError::HttpStatus {
                url,
                status: status.as_u16(),
            });
        }
        Ok(Some(resp))
    }
}

impl TradeSource for ApiSource {
    fn name(&self) -> &'static str {
        "api"
    }

    fn fetch_trades(&self) -> Result<Vec<TradeRecord>, SourceError> {
        let Some(resp) = self.get("trades")? else {
            return Ok(Vec::new());
        };
        let items: Vec<serde_json::Value> = resp.json()?;
        let parsed = items.into_iter().enumerate().map(|(i, item)| {
            serde_json::from_value::<TradeRecord>(item).map_err(|e| SourceError::InvalidRow {
                row: i,
                reason: e.to_string(),
            })
        });
        let trades = keep_valid_rows(self.name(), parsed)?;
        debug!(trades = trades.len(), "trades loaded from API");
        Ok(sort_by_entry(trades))
    }

    fn fetch_context(&self) -> Result<ContextStore, SourceError> {
        let Some(resp) = self.get("context")? else {
            return Ok(ContextStore::new());
        };
        let data: ContextData = resp.json()?;
        Ok(ContextStore::from_data(data))
    }
}

// ─── CSV ─────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CsvTradeRow {
    algorithm: String,
    symbol: String,
    asset_class: String,
    direction: String,
    entry_time: String,
    exit_time: String,
    return_pct: f64,
    position_size: f64,
    signal_strength: f64,
}

/// Header-bearing CSV of closed trades plus an optional JSON context file.
pub struct CsvSource {
    path: PathBuf,
    context_path: Option<PathBuf>,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, context_path: Option<PathBuf>) -> Self {
        Self {
            path: path.into(),
            context_path,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TradeSource for CsvSource {
    fn name(&self) -> &'static str {
        "csv"
    }

    fn fetch_trades(&self) -> Result<Vec<TradeRecord>, SourceError> {
        let mut reader = csv::Reader::from_path(&self.path)?;
        let rows = reader.deserialize::<CsvTradeRow>().enumerate();
        let parsed = rows.map(|(i, row)| -> Result<TradeRecord, SourceError> {
            let r = row.map_err(|e| {
                if matches!(
                    e.kind(),
                    csv::ErrorKind::Deserialize { .. } | csv::ErrorKind::UnequalLengths { .. }
                ) {
                    SourceError::InvalidRow {
                        row: i,
                        reason: e.to_string(),
                    }
                } else {
                    SourceError::Csv(e)
                }
            })?;
            Ok(TradeRecord {
                direction: parse_direction(i, &r.direction)?,
                entry_time: parse_time(i, "entry_time", &r.entry_time)?,
                exit_time: parse_time(i, "exit_time", &r.exit_time)?,
                asset_class: AssetClass::from_label(&r.asset_class),
                algorithm: r.algorithm,
                symbol: r.symbol,
                return_pct: r.return_pct,
                position_size: r.position_size,
                signal_strength: r.signal_strength,
            })
        });
        let trades = keep_valid_rows(self.name(), parsed)?;
        debug!(trades = trades.len(), path = %self.path.display(), "trades loaded from CSV");
        Ok(sort_by_entry(trades))
    }

    fn fetch_context(&self) -> Result<ContextStore, SourceError> {
        let Some(path) = &self.context_path else {
            return Ok(ContextStore::new());
        };
        let bytes = std::fs::read(path).map_err(|source| SourceError::Io {
            path: path.clone(),
            source,
        })?;
        let data: ContextData = serde_json::from_slice(&bytes)?;
        Ok(ContextStore::from_data(data))
    }
}

/// Write trades in the layout [`CsvSource`] reads.
pub fn write_trades_csv(path: &Path, trades: &[TradeRecord]) -> Result<(), SourceError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "algorithm",
        "symbol",
        "asset_class",
        "direction",
        "entry_time",
        "exit_time",
        "return_pct",
        "position_size",
        "signal_strength",
    ])?;
    for t in trades {
        let asset_class = serde_json::to_value(t.asset_class)?;
        let direction = serde_json::to_value(t.direction)?;
        writer.write_record([
            t.algorithm.clone(),
            t.symbol.clone(),
            asset_class.as_str().unwrap_or("other").to_string(),
            direction.as_str().unwrap_or("long").to_string(),
            t.entry_time.to_rfc3339(),
            t.exit_time.to_rfc3339(),
            t.return_pct.to_string(),
            t.position_size.to_string(),
            t.signal_strength.to_string(),
        ])?;
    }
    writer.flush().map_err(|source| SourceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(())
}
