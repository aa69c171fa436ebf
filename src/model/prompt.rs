use crate::error::Result;
use crate::types::ConsultationRequest;

/// Render the analyst prompt with the run data embedded as JSON
pub fn build_prompt(request: &ConsultationRequest, language: &str) -> Result<String> {
    let payload = serde_json::to_string_pretty(request)?;

    Ok(format!(
        r#"You are a strict financial analyst. You follow compliance rules and explain conclusions without emotion.

You are an experienced investment analyst. Use the data provided (JSON below) to prepare a structured report in {language}.

Response requirements (Markdown):
1. Brief market state (1 paragraph, state the S&P 500 move).
2. Screener results table (ticker, sector, price, P/E, P/B, Current Ratio, Debt/Assets, TradingView technical rating, RSI, EMA20).
3. A separate section on new ideas (new_symbols) with a deeper look at each company.
4. Risks section (sector-wide and individual).
5. If there are dropped_symbols, mention why they may have dropped out.

Data:
{payload}
"#
    ))
}
