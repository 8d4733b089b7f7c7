mod common;

use std::time::{Duration, Instant};

use common::{MockScope, Sweep};
use scope_trace::{Oscilloscope, PollPolicy};

fn armed(sweep:Sweep) -> MockScope {
	let mut scope = MockScope::new(vec![], sweep);
	scope.arm().unwrap();
	scope
}

#[test]
fn stops_after_k_plus_one_polls_with_backoff() {
	let policy = PollPolicy { attempts: 10, interval_ms: 20 };
	for k in [0u32, 1, 4, 9] {
		let mut scope = armed(Sweep::StopsAfter(k + 1));
		let started = Instant::now();
		assert!(scope.poll_trigger_complete(&policy).unwrap());
		assert_eq!(scope.polls, k + 1);
		assert!(started.elapsed() >= Duration::from_millis(20) * k);
	}
}

#[test]
fn gives_up_after_exactly_the_budget() {
	let policy = PollPolicy { attempts: 10, interval_ms: 1 };
	let mut scope = armed(Sweep::Never);
	assert!(!scope.poll_trigger_complete(&policy).unwrap());
	assert_eq!(scope.polls, 10);
}

#[test]
fn default_budget_is_ten_polls_half_a_second_apart() {
	let policy = PollPolicy::default();
	assert_eq!(policy.attempts, 10);
	assert_eq!(policy.interval(), Duration::from_millis(500));
}
