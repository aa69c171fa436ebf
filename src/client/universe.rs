//! Index constituent lists
//!
//! Two source formats are understood: the Wikipedia S&P 500 page
//! (`table#constituents`) and a constituents CSV with a `Symbol` column.
//! Share classes are mapped to Yahoo notation (`BRK.B` -> `BRK-B`).

use scraper::{Html, Selector};

pub const WIKIPEDIA_SP500_URL: &str = "https://en.wikipedia.org/wiki/List_of_S%26P_500_companies";

/// Parse a downloaded constituents document, HTML or CSV
pub fn parse_universe(body: &str) -> Vec<String> {
    if body.trim_start().starts_with('<') {
        parse_universe_html(body)
    } else {
        parse_universe_csv(body)
    }
}

/// First cell of every body row of `table#constituents`
pub fn parse_universe_html(html: &str) -> Vec<String> {
    let document = Html::parse_document(html);
    let (Ok(rows), Ok(first_cell)) = (Selector::parse("table#constituents tr"), Selector::parse("td")) else {
        return Vec::new();
    };

    document
        .select(&rows)
        .filter_map(|row| row.select(&first_cell).next())
        .map(|cell| cell.text().collect::<String>())
        .filter_map(|text| normalize_symbol(&text))
        .collect()
}

/// `Symbol` column of a constituents CSV
pub fn parse_universe_csv(text: &str) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let column = match reader.headers() {
        Ok(headers) => headers
            .iter()
            .position(|h| h.trim().trim_start_matches('\u{feff}').eq_ignore_ascii_case("symbol")),
        Err(e) => {
            tracing::warn!("Unreadable constituents CSV header: {}", e);
            None
        }
    };
    let Some(column) = column else {
        return Vec::new();
    };

    reader
        .records()
        .filter_map(|record| match record {
            Ok(record) => record.get(column).and_then(normalize_symbol),
            Err(e) => {
                tracing::debug!("Skipping malformed constituents row: {}", e);
                None
            }
        })
        .collect()
}

fn normalize_symbol(raw: &str) -> Option<String> {
    let symbol = raw.trim().to_uppercase().replace('.', "-");
    (!symbol.is_empty()).then_some(symbol)
}
