// =============================================================================
// Notifier — outbound chat-notification transport boundary (§10.6)
// =============================================================================
//
// The real transport (Slack/Discord/whatever) is the out-of-scope external
// collaborator named in §1; this crate only needs the trait boundary and the
// call sites (fills, daily-reset summary) to exist. `LoggingNotifier` is the
// only implementation shipped.
// =============================================================================

use tracing::info;

use crate::execution_tracker::Fill;

/// Events the dispatcher notifies on (§4.9 items 4 and 7).
#[derive(Debug, Clone)]
pub enum NotificationEvent {
    Fill(Fill),
    DailySummary {
        realized_pnl: f64,
        total_trades: u64,
        total_fills: usize,
    },
}

pub trait Notifier: Send + Sync {
    fn notify(&self, event: &NotificationEvent);
}

/// Logs every notification at `info!` rather than sending it anywhere.
pub struct LoggingNotifier;

impl Notifier for LoggingNotifier {
    fn notify(&self, event: &NotificationEvent) {
        match event {
            NotificationEvent::Fill(fill) => {
                info!(
                    asset_id = %fill.asset_id,
                    side = %fill.side,
                    price = fill.price,
                    size = fill.size,
                    "fill notification"
                );
            }
            NotificationEvent::DailySummary {
                realized_pnl,
                total_trades,
                total_fills,
            } => {
                info!(
                    realized_pnl,
                    total_trades, total_fills, "daily summary notification"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;

    #[test]
    fn logging_notifier_does_not_panic_on_either_event() {
        let notifier = LoggingNotifier;
        notifier.notify(&NotificationEvent::Fill(Fill {
            trade_id: "t".into(),
            order_id: "o".into(),
            asset_id: "a".into(),
            side: Side::Buy,
            price: 0.5,
            size: 1.0,
            timestamp: 0,
        }));
        notifier.notify(&NotificationEvent::DailySummary {
            realized_pnl: 1.0,
            total_trades: 1,
            total_fills: 1,
        });
    }
}
