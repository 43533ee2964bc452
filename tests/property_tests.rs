mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use lucent::schema::{sortable_double, sortable_long};
use lucent::{GraphOptions, Record, Value, WriteBuffer};
use proptest::prelude::*;

proptest! {
    #[test]
    fn sortable_long_preserves_order(a in any::<i64>(), b in any::<i64>()) {
        prop_assert_eq!(a.cmp(&b), sortable_long(a).cmp(&sortable_long(b)));
    }

    #[test]
    fn sortable_double_preserves_order(
        a in any::<f64>().prop_filter("not NaN", |v| !v.is_nan()),
        b in any::<f64>().prop_filter("not NaN", |v| !v.is_nan()),
    ) {
        let expected = a.partial_cmp(&b).unwrap();
        prop_assert_eq!(expected, sortable_double(a).cmp(&sortable_double(b)));
    }
}

#[derive(Debug, Clone)]
enum Op {
    Set { slot: usize, value: i64 },
    Delete { slot: usize },
    Flush,
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        6 => (0usize..4, any::<i64>()).prop_map(|(slot, value)| Op::Set { slot, value }),
        2 => (0usize..4).prop_map(|slot| Op::Delete { slot }),
        1 => Just(Op::Flush),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn latest_write_wins_per_id(ops in prop::collection::vec(arb_op(), 1..40)) {
        common::init_tracing();
        let buffer = WriteBuffer::open(
            GraphOptions::in_memory()
                .flush_threshold(1_000)
                .flush_interval(Duration::from_secs(60))
                .reopen_interval(Duration::from_secs(60)),
        )
        .unwrap();
        let ids: Vec<_> = (0..4).map(|_| buffer.engine().allocate_id()).collect();
        let mut model: BTreeMap<usize, Option<i64>> = BTreeMap::new();

        for op in ops {
            match op {
                Op::Set { slot, value } => {
                    let mut record = Record::vertex(ids[slot], None);
                    record.set_property("v", Value::Long(value));
                    buffer.put(record).unwrap();
                    model.insert(slot, Some(value));
                }
                Op::Delete { slot } => {
                    buffer.delete(ids[slot], None).unwrap();
                    model.insert(slot, None);
                }
                Op::Flush => {
                    buffer.flush_now().unwrap();
                }
            }
            for (slot, expected) in &model {
                let found = buffer.find_by_id(ids[*slot]).unwrap();
                let value = found.and_then(|r| r.property("v").and_then(Value::as_long));
                prop_assert_eq!(value, *expected);
            }
        }

        buffer.refresh().unwrap();
        for (slot, expected) in &model {
            let stored = buffer.engine().get(ids[*slot]).unwrap();
            let value = stored.and_then(|r| r.property("v").and_then(Value::as_long));
            prop_assert_eq!(value, *expected);
        }
    }
}
