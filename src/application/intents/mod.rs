//! Intent generation stage: drift trades, dust suppression, turnover cap,
//! and the tax-aware sell budget.

pub mod generator;
pub mod tax;
pub mod turnover;

use crate::domain::model::diagnostics::{TaxBudgetConstraintEvent, warning_code};
use crate::domain::model::intent::{DroppedIntent, Intent, SuppressedIntent};
use crate::domain::model::market::MarketDataSnapshot;
use crate::domain::model::options::EngineOptions;
use crate::domain::model::portfolio::PortfolioSnapshot;
use crate::domain::model::result::TaxImpact;
use crate::domain::model::shelf::Shelf;
use crate::domain::model::state::SimulatedState;
use crate::domain::model::target::{TargetSet, Universe};

#[derive(Debug, Default)]
pub struct IntentStageOutput {
    pub intents: Vec<Intent>,
    pub suppressed: Vec<SuppressedIntent>,
    pub dropped: Vec<DroppedIntent>,
    pub warnings: Vec<String>,
    pub tax_impact: Option<TaxImpact>,
    pub tax_events: Vec<TaxBudgetConstraintEvent>,
    pub price_missing: Vec<String>,
    pub fx_missing: Vec<String>,
    pub missing_fx_pairs: Vec<String>,
}

#[allow(clippy::too_many_arguments)]
pub fn generate_intents(
    universe: &Universe,
    target: &TargetSet,
    before: &SimulatedState,
    portfolio: &PortfolioSnapshot,
    market_data: &MarketDataSnapshot,
    shelf: &Shelf,
    options: &EngineOptions,
) -> IntentStageOutput {
    let drift = generator::drift_to_intents(universe, target, before, market_data, shelf, options);

    let mut output = IntentStageOutput {
        suppressed: drift.suppressed,
        price_missing: drift.price_missing,
        fx_missing: drift.fx_missing,
        missing_fx_pairs: drift.missing_fx_pairs,
        ..IntentStageOutput::default()
    };

    let mut intents = drift.intents;

    if let Some(max_turnover) = options.max_turnover_pct {
        let outcome = turnover::apply_turnover_cap(intents, before.total_value, max_turnover);
        intents = outcome.kept;
        if !outcome.dropped.is_empty() {
            output
                .warnings
                .push(warning_code::PARTIAL_REBALANCE_TURNOVER_LIMIT.to_string());
        }
        output.dropped = outcome.dropped;
    }

    if options.enable_tax_awareness {
        let outcome = tax::apply_tax_budget(
            intents,
            portfolio,
            market_data,
            options.max_realized_capital_gains,
        );
        intents = outcome.intents;
        if outcome.impact.budget_exhausted {
            output
                .warnings
                .push(warning_code::TAX_BUDGET_LIMIT_REACHED.to_string());
        }
        output.tax_events = outcome.events;
        output.tax_impact = Some(outcome.impact);
    }

    output.intents = intents;
    output
}
