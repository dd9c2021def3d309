//! Property tests for the runtime against the reference model.

use proptest::prelude::*;
use rewind_core::{Context, RuntimeConfig, TransactionResult};
use rewind_testkit::prelude::*;
use std::cell::RefCell;
use std::rc::Rc;

proptest! {
    #![proptest_config(PropTestConfig::default().to_proptest_config())]

    #[test]
    fn abort_restores_every_write(ops in write_ops_strategy(16, 64)) {
        let ctx = TestContext::new();
        let buffer = SlotBuffer::new(16);
        let before = buffer.snapshot();

        let result = ctx.transact(|| {
            for op in &ops {
                buffer.write(&ctx, op.slot, op.value)?;
            }
            ctx.abort_by_request_and_throw()?;
            Ok(())
        });

        prop_assert_eq!(result, TransactionResult::AbortedByRequest);
        prop_assert_eq!(buffer.snapshot(), before);
    }

    #[test]
    fn commit_keeps_last_write(ops in write_ops_strategy(16, 64)) {
        let ctx = TestContext::new();
        let buffer = SlotBuffer::new(16);
        let mut model = buffer.snapshot();
        for op in &ops {
            model[op.slot] = op.value;
        }

        let result = ctx.transact(|| {
            for op in &ops {
                buffer.write(&ctx, op.slot, op.value)?;
            }
            Ok(())
        });

        prop_assert_eq!(result, TransactionResult::Committed);
        prop_assert_eq!(buffer.snapshot(), model);
    }

    #[test]
    fn repeated_span_logs_once(size in small_size_strategy(), offset in 0usize..16, repeats in 1usize..8) {
        let ctx = TestContext::new();
        let bytes = ByteBuffer::new(vec![0u8; 32]);

        let mut logged = 0;
        let result = ctx.transact(|| {
            for _ in 0..repeats {
                bytes.record(&ctx, offset, size)?;
            }
            logged = ctx.write_log_len();
            Ok(())
        });

        prop_assert_eq!(result, TransactionResult::Committed);
        prop_assert_eq!(logged, 1);
        prop_assert_eq!(ctx.stats().snapshot().writes_skipped_duplicate, repeats as u64 - 1);
    }

    #[test]
    fn commit_tasks_forward_abort_tasks_reverse(count in 1usize..16, abort in any::<bool>()) {
        let ctx = TestContext::new();
        let order = Rc::new(RefCell::new(Vec::new()));

        let result = ctx.transact(|| {
            for i in 0..count {
                let commit_order = Rc::clone(&order);
                ctx.on_commit(move || commit_order.borrow_mut().push(i));
                let abort_order = Rc::clone(&order);
                ctx.on_abort(move || abort_order.borrow_mut().push(i));
            }
            if abort {
                ctx.abort_by_request_and_throw()?;
            }
            Ok(())
        });

        let mut expected: Vec<usize> = (0..count).collect();
        if abort {
            prop_assert_eq!(result, TransactionResult::AbortedByRequest);
            expected.reverse();
        } else {
            prop_assert_eq!(result, TransactionResult::Committed);
        }
        prop_assert_eq!(order.borrow().clone(), expected);
    }

    #[test]
    fn nested_plans_match_model(plan in tx_plan_strategy(8, 3, true), retry in retry_mode_strategy()) {
        let ctx = Context::new(RuntimeConfig::new().retry(retry));
        let buffer = SlotBuffer::new(8);
        let mut model = buffer.snapshot();

        let expected = apply_to_model(&mut model, &plan);
        let actual = run_plan(&ctx, &buffer, &plan);

        prop_assert_eq!(actual, expected);
        prop_assert_eq!(buffer.snapshot(), model);
        prop_assert_eq!(ctx.transaction_depth(), 0);
        prop_assert_eq!(ctx.nest_depth(), 0);
    }
}

#[test]
fn scenario_reports_serialize() {
    let reports = run_all();
    let json = serde_json::to_string(&reports).unwrap();
    for scenario in Scenario::ALL {
        assert!(json.contains(scenario.name()));
    }
    assert!(reports.iter().all(|report| report.passed));
}
