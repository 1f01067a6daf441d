//! `percolate interval`

use std::time::Duration;

use anyhow::Result;
use percolate_poll::{EnvironmentSnapshot, IntervalCalculator, IntervalInput, NextPoll};
use serde_json::json;

use crate::cli::IntervalArgs;
use crate::settings::Settings;

pub fn run(args: &IntervalArgs, settings: &Settings) -> Result<()> {
    let next = decide(args, settings);
    println!("{}", render(next, args.json));
    Ok(())
}

fn decide(args: &IntervalArgs, settings: &Settings) -> NextPoll {
    let input = IntervalInput {
        base: Duration::from_millis(args.base_ms),
        order_count: args.orders,
        has_active_orders: args.active,
        consecutive_errors: args.errors,
        context: args.context.into(),
    };
    let env = EnvironmentSnapshot {
        quality: args.quality.into(),
        visible: !args.hidden,
        idle: Duration::from_millis(args.idle_ms),
        interaction_intensity: 0,
    };
    IntervalCalculator::new(&settings.engine).compute("cli", &input, &env)
}

fn render(next: NextPoll, as_json: bool) -> String {
    match (next, as_json) {
        (NextPoll::After(delay), false) => format!("next poll in {} ms", delay.as_millis()),
        (NextPoll::Stop, false) => "stop: waiting for connectivity".to_string(),
        (NextPoll::After(delay), true) => {
            json!({"decision": "after", "delay_ms": delay.as_millis() as u64}).to_string()
        }
        (NextPoll::Stop, true) => json!({"decision": "stop"}).to_string(),
    }
}
