//! Property tests for directory parsing, id generation and symbol ids.

#![allow(clippy::unwrap_used)]

use std::collections::HashSet;

use proptest::prelude::*;
use stock_tracker::application::services::dedupe_symbols;
use stock_tracker::{
    ListedSymbol, UniqueIdGenerator, decode_id, normalize_symbol, parse_directory,
    stable_symbol_id,
};

fn flag() -> impl Strategy<Value = &'static str> {
    prop_oneof![Just("Y"), Just("N"), Just("")]
}

fn row() -> impl Strategy<Value = (String, String, &'static str, &'static str)> {
    ("[A-Z]{1,5}", "[A-Za-z ]{0,12}", flag(), flag())
}

fn render(rows: &[(String, String, &'static str, &'static str)]) -> String {
    let mut body = String::from(
        "Symbol|Security Name|Market Category|Test Issue|Financial Status|Round Lot Size|ETF|NextShares\n",
    );
    for (symbol, name, test_issue, etf) in rows {
        body.push_str(&format!("{symbol}|{name}|Q|{test_issue}|N|100|{etf}|N\n"));
    }
    body.push_str("File Creation Time: 0105202612:00|||||||\n");
    body
}

proptest! {
    #[test]
    fn parser_never_panics_on_arbitrary_input(body in any::<String>(), max in 0usize..50) {
        let parsed = parse_directory(&body, max);
        prop_assert!(parsed.len() <= max);
    }

    #[test]
    fn parser_drops_flagged_and_blank_rows(rows in prop::collection::vec(row(), 0..40), max in 1usize..60) {
        let parsed = parse_directory(&render(&rows), max);

        let expected: Vec<&String> = rows
            .iter()
            .filter(|(_, name, test_issue, etf)| {
                !name.trim().is_empty() && *test_issue != "Y" && *etf != "Y"
            })
            .map(|(symbol, ..)| symbol)
            .take(max)
            .collect();

        prop_assert_eq!(parsed.len(), expected.len());
        for (listed, symbol) in parsed.iter().zip(expected) {
            prop_assert_eq!(&listed.symbol, symbol);
        }
    }

    #[test]
    fn dedupe_leaves_unique_normalized_symbols(symbols in prop::collection::vec("[A-Za-z]{1,4}", 0..60)) {
        let listed: Vec<ListedSymbol> = symbols
            .iter()
            .map(|s| ListedSymbol::new(s.as_str(), "Name"))
            .collect();
        let unique = dedupe_symbols(listed);

        let distinct: HashSet<String> = symbols.iter().map(|s| normalize_symbol(s)).collect();
        prop_assert_eq!(unique.len(), distinct.len());
        for listed in &unique {
            prop_assert_eq!(&listed.symbol, &normalize_symbol(&listed.symbol));
        }
    }

    #[test]
    fn symbol_ids_ignore_case_and_padding(symbol in "[A-Za-z]{1,6}") {
        let padded = format!("  {}  ", symbol.to_lowercase());
        prop_assert_eq!(stable_symbol_id(&symbol), stable_symbol_id(&padded));
    }

    #[test]
    fn generated_ids_increase_and_carry_machine_id(machine_id in 0i64..1024, count in 1usize..2000) {
        let ids = UniqueIdGenerator::new(machine_id).unwrap();
        let mut last = 0;
        for _ in 0..count {
            let id = ids.next_id().unwrap();
            prop_assert!(id > last);
            prop_assert_eq!(decode_id(id).machine_id, machine_id);
            last = id;
        }
    }
}
