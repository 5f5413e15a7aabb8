//! Property-based tests for matching-engine invariants
//!
//! - Determinism: identical inputs (including row order) produce
//!   identical outputs
//! - Conservation: every keyed input row surfaces in exactly one record
//! - Agreeing three-way triples with RC=00 always match

use chrono::NaiveDate;
use matching_engine::{EngineInput, MatchingEngine};
use proptest::prelude::*;
use recon_core::types::{
    CarryOverState, DrCr, MatchStatus, ResponseCode, Source, TranType, Txn,
};
use recon_core::Config;
use rust_decimal::Decimal;

fn txn(source: Source, rrn: u64, cents: i64, dr_cr: DrCr, rc: ResponseCode) -> Txn {
    Txn {
        upi_tran_id: None,
        rrn: Some(format!("{:012}", rrn)),
        amount: Decimal::new(cents, 2),
        tran_date: NaiveDate::from_ymd_opt(2026, 1, 4).unwrap(),
        tran_time: None,
        dr_cr,
        rc,
        tran_type: TranType::default(),
        payer_psp: None,
        payee_psp: None,
        mcc: None,
        channel: None,
        source,
    }
}

fn rc_strategy() -> impl Strategy<Value = ResponseCode> {
    prop_oneof![
        Just(ResponseCode::Success),
        Just(ResponseCode::Deemed),
        Just(ResponseCode::Fail("U30".to_string())),
        Just(ResponseCode::Unspecified),
    ]
}

fn dr_cr_strategy() -> impl Strategy<Value = DrCr> {
    prop_oneof![Just(DrCr::Debit), Just(DrCr::Credit), Just(DrCr::Unspecified)]
}

#[derive(Debug, Clone)]
struct Row {
    rrn: u64,
    cents: i64,
    dr_cr: DrCr,
    rc: ResponseCode,
    in_cbs: bool,
    in_switch: bool,
    in_npci: bool,
}

fn row_strategy() -> impl Strategy<Value = Row> {
    (
        100_000_000_000u64..100_000_000_050u64,
        1i64..100_000_00i64,
        dr_cr_strategy(),
        rc_strategy(),
        any::<bool>(),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(rrn, cents, dr_cr, rc, in_cbs, in_switch, in_npci)| Row {
            rrn,
            cents,
            dr_cr,
            rc,
            in_cbs,
            in_switch,
            in_npci,
        })
}

fn input_from(rows: &[Row]) -> EngineInput {
    let mut input = EngineInput::default();
    for row in rows {
        if row.in_cbs {
            input
                .cbs
                .push(txn(Source::Cbs, row.rrn, row.cents, row.dr_cr, row.rc.clone()));
        }
        if row.in_switch {
            input.switch.push(txn(
                Source::Switch,
                row.rrn,
                row.cents,
                row.dr_cr,
                row.rc.clone(),
            ));
        }
        if row.in_npci {
            input.npci.push(txn(
                Source::Npci,
                row.rrn,
                row.cents,
                DrCr::Unspecified,
                row.rc.clone(),
            ));
        }
    }
    input
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn identical_inputs_produce_identical_outputs(rows in proptest::collection::vec(row_strategy(), 0..25)) {
        let engine = MatchingEngine::new(Config::default());
        let a = engine
            .run_cycle("RUN_P", Some("1C"), input_from(&rows), CarryOverState::default())
            .unwrap();
        let b = engine
            .run_cycle("RUN_P", Some("1C"), input_from(&rows), CarryOverState::default())
            .unwrap();

        prop_assert_eq!(
            serde_json::to_string(&a.output.records).unwrap(),
            serde_json::to_string(&b.output.records).unwrap()
        );
    }

    #[test]
    fn every_keyed_row_lands_in_a_record(rows in proptest::collection::vec(row_strategy(), 0..25)) {
        let engine = MatchingEngine::new(Config::default());
        let outcome = engine
            .run_cycle("RUN_P", Some("1C"), input_from(&rows), CarryOverState::default())
            .unwrap();

        for row in &rows {
            if row.in_cbs || row.in_switch || row.in_npci {
                let key = format!("{:012}", row.rrn);
                prop_assert!(
                    outcome.output.records.contains_key(&key),
                    "row {} missing from records",
                    key
                );
            }
        }
    }

    #[test]
    fn agreeing_successful_triples_match(
        rrn in 100_000_000_000u64..999_999_999_999u64,
        cents in 1i64..100_000_00i64,
    ) {
        let engine = MatchingEngine::new(Config::default());
        let input = EngineInput {
            cbs: vec![txn(Source::Cbs, rrn, cents, DrCr::Credit, ResponseCode::Success)],
            switch: vec![txn(Source::Switch, rrn, cents, DrCr::Credit, ResponseCode::Success)],
            npci: vec![txn(Source::Npci, rrn, cents, DrCr::Unspecified, ResponseCode::Success)],
            adjustments: vec![],
        };
        let outcome = engine
            .run_cycle("RUN_P", Some("1C"), input, CarryOverState::default())
            .unwrap();

        let record = &outcome.output.records[&format!("{:012}", rrn)];
        prop_assert_eq!(record.status, MatchStatus::Matched);
        prop_assert_eq!(record.populated_sources(), 3);
    }
}
