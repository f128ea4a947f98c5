use crate::metrics::MetricsCollector;
use crate::traits::{EventSink, TxEvent, TxEventOutcome, WalletEvent};
use chrono::Local;
use nu_ansi_term::{Color, Style};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Event, Level, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{format::Writer, FmtContext, FormatEvent, FormatFields},
    prelude::*,
    registry::LookupSpan,
    Layer,
};

/// Target used for per-transaction and per-wallet result lines.
pub const TX_RESULT_TARGET: &str = "tx_result";

/// Result lines at INFO, everything else from WARN up.
fn file_filter() -> tracing_subscriber::filter::Targets {
    tracing_subscriber::filter::Targets::new()
        .with_target(TX_RESULT_TARGET, Level::INFO)
        .with_default(Level::WARN)
}

/// Installs the console and hourly-rolling file layers. `console_level` comes
/// from `LOG_LEVEL` and falls back to INFO. The returned guard must be kept
/// alive for the file writer to flush.
pub fn setup_logger(log_dir: &str, console_level: Option<&str>) -> Option<WorkerGuard> {
    std::fs::create_dir_all(log_dir).ok();

    let file_appender = tracing_appender::rolling::hourly(log_dir, "sweeper");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .event_format(FileFormatter)
        .with_filter(file_filter());

    let level = console_level
        .and_then(|l| Level::from_str(l).ok())
        .unwrap_or(Level::INFO);
    let console_filter = tracing_subscriber::filter::Targets::new()
        .with_target(TX_RESULT_TARGET, Level::INFO)
        .with_default(level);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_ansi(true)
        .event_format(TerminalFormatter)
        .with_filter(console_filter);

    let installed = tracing_subscriber::registry()
        .with(file_layer)
        .with(console_layer)
        .try_init();

    match installed {
        Ok(()) => Some(guard),
        Err(_) => None,
    }
}

/// Event sink that writes result lines through `tracing` and keeps counters.
#[derive(Debug, Clone)]
pub struct TracingSink {
    metrics: Arc<MetricsCollector>,
}

impl TracingSink {
    pub fn new(metrics: Arc<MetricsCollector>) -> Self {
        Self { metrics }
    }

    pub fn metrics(&self) -> &Arc<MetricsCollector> {
        &self.metrics
    }
}

impl EventSink for TracingSink {
    fn on_tx(&self, event: &TxEvent) {
        self.metrics.record_tx(event);

        let hash = event.hash.as_deref().unwrap_or("-");
        match &event.outcome {
            TxEventOutcome::Submitted => tracing::info!(
                target: TX_RESULT_TARGET,
                "[{}] {} attempt {} submitted | gas {} | fee {} | hash {}",
                event.wallet, event.kind, event.attempt, event.gas, event.fee, hash
            ),
            TxEventOutcome::OutOfGas => tracing::warn!(
                target: TX_RESULT_TARGET,
                "[{}] {} attempt {} ran out of gas at {} | hash {}",
                event.wallet, event.kind, event.attempt, event.gas, hash
            ),
            TxEventOutcome::Confirmed => tracing::info!(
                target: TX_RESULT_TARGET,
                "[{}] {} SUCCESS after {} attempt(s) | gas {} | fee {} | hash {}",
                event.wallet, event.kind, event.attempt, event.gas, event.fee, hash
            ),
            TxEventOutcome::Rejected { code, message } => tracing::error!(
                target: TX_RESULT_TARGET,
                "[{}] {} FAILED: rejected (code {}) {} | hash {}",
                event.wallet,
                event.kind,
                code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
                message,
                hash
            ),
            TxEventOutcome::Unconfirmed => tracing::error!(
                target: TX_RESULT_TARGET,
                "[{}] {} FAILED: not confirmed after {} attempt(s) | hash {}",
                event.wallet, event.kind, event.attempt, hash
            ),
            TxEventOutcome::InsufficientFunds { balance } => tracing::warn!(
                target: TX_RESULT_TARGET,
                "[{}] {} stopped: balance {} below fee {}",
                event.wallet, event.kind, balance, event.fee
            ),
            TxEventOutcome::DryRun => tracing::info!(
                target: TX_RESULT_TARGET,
                "[{}] {} dry run | gas {} | fee {}",
                event.wallet, event.kind, event.gas, event.fee
            ),
        }
    }

    fn on_wallet(&self, event: &WalletEvent) {
        self.metrics.record_wallet(event);

        if let Some(err) = &event.error {
            tracing::error!(target: TX_RESULT_TARGET, "[{}] FAILED: {}", event.wallet, err);
        } else if event.action_performed {
            tracing::info!(
                target: TX_RESULT_TARGET,
                "[{}] done with actions | rewards withdrawn: {} | sent: {}",
                event.wallet, event.reward_withdrawn, event.amount_sent
            );
        } else {
            tracing::info!(target: TX_RESULT_TARGET, "[{}] done, nothing to do", event.wallet);
        }
    }
}

// --- Formatters ---

struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

pub struct TerminalFormatter;

impl<S, N> FormatEvent<S, N> for TerminalFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut msg_visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut msg_visitor);
        let msg = msg_visitor.message;

        let colored_msg = if msg.contains("SUCCESS") {
            let green_text = Style::new().fg(Color::LightGreen).bold();
            msg.replace("SUCCESS", &format!("{}", green_text.paint("SUCCESS")))
        } else if msg.contains("FAILED") {
            let red_text = Style::new().fg(Color::LightRed).bold();
            msg.replace("FAILED", &format!("{}", red_text.paint("FAILED")))
        } else {
            msg
        };

        let level = *event.metadata().level();
        let time = Local::now().format("%H:%M:%S");
        if level == Level::WARN {
            write!(writer, "{} {} ", time, Color::Yellow.paint("WARN"))?;
        } else if level == Level::ERROR {
            write!(writer, "{} {} ", time, Color::Red.paint("ERROR"))?;
        } else {
            write!(writer, "{} ", time)?;
        }

        write!(writer, "{}", colored_msg)?;
        writeln!(writer)
    }
}

pub struct FileFormatter;

impl<S, N> FormatEvent<S, N> for FileFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        _ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
        let level = event.metadata().level();

        write!(writer, "{} [{}] ", timestamp, level)?;

        let mut msg_visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut msg_visitor);
        writeln!(writer, "{}", msg_visitor.message)
    }
}
