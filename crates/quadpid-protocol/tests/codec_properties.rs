//! 编解码属性测试
//!
//! 1. 任意输入都不会让 `decode` panic
//! 2. 目标角 / 增益消息编码后可以原样解码
//! 3. `effective()` 只去掉哨兵字段

use proptest::prelude::*;
use quadpid_protocol::{GainUpdate, GoalCommand, GoalUpdate, Message, SENTINEL, decode, encode};

/// 线上能精确往返的数值（八分之一的整数倍）
fn eighths() -> impl Strategy<Value = f64> {
    (-80_000i32..80_000).prop_map(|n| f64::from(n) / 8.0)
}

fn gain_field() -> impl Strategy<Value = Option<f64>> {
    prop_oneof![
        Just(None),
        Just(Some(SENTINEL)),
        eighths().prop_map(Some),
    ]
}

proptest! {
    #[test]
    fn prop_decode_never_panics(line in ".{0,64}") {
        let _ = decode(&line);
    }

    #[test]
    fn prop_goal_survives_wire(value in eighths()) {
        let line = encode(&Message::Goal(GoalUpdate::new(value))).unwrap();
        match decode(&line).unwrap() {
            Message::Goal(goal) => {
                prop_assert_eq!(goal.value, value);
                prop_assert_eq!(goal.command() == GoalCommand::Reset, value == SENTINEL);
            },
            other => prop_assert!(false, "unexpected {:?}", other),
        }
    }

    #[test]
    fn prop_effective_strips_only_sentinels(
        p in gain_field(),
        i in gain_field(),
        d in gain_field(),
    ) {
        let update = GainUpdate { p, i, d };
        let eff = update.effective();
        let strip = |v: Option<f64>| v.filter(|x| *x != SENTINEL);
        prop_assert_eq!(eff.p, strip(p));
        prop_assert_eq!(eff.i, strip(i));
        prop_assert_eq!(eff.d, strip(d));
        prop_assert_eq!(update.is_noop(), eff.p.is_none() && eff.i.is_none() && eff.d.is_none());

        let line = encode(&Message::Gains(update)).unwrap();
        prop_assert_eq!(decode(&line).unwrap(), Message::Gains(update));
    }
}
