use flow::errors::FlowError;
use flow::lease::with_lease;
use flow::repository::FlowRepository;
use flow::stubs::InMemoryFlowRepository;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn second_holder_fails_fast_and_lease_is_released_on_return() {
  let repo = InMemoryFlowRepository::new();

  let result = with_lease(&repo, "inst-1", 30, || {
    // a nested attempt while the lease is held must fail immediately
    let inner = with_lease(&repo, "inst-1", 30, || Ok(()));
    match inner {
      Err(FlowError::LockUnavailable(_)) => {}
      other => panic!("expected LockUnavailable, got {:?}", other),
    }
    Ok(42)
  });
  assert_eq!(result.expect("outer lease succeeds"), 42);

  // released after the winner's function returned
  let again = with_lease(&repo, "inst-1", 30, || Ok(1));
  assert!(again.is_ok());
}

#[test]
fn lease_is_released_when_the_function_errors() {
  let repo = InMemoryFlowRepository::new();

  let result: Result<(), FlowError> = with_lease(&repo, "inst-2", 30, || {
    Err(FlowError::Other("boom".to_string()))
  });
  assert!(matches!(result, Err(FlowError::Other(_))));

  let again = with_lease(&repo, "inst-2", 30, || Ok(()));
  assert!(again.is_ok());
}

#[test]
fn lease_is_released_when_the_function_panics() {
  let repo = InMemoryFlowRepository::new();

  let outcome = catch_unwind(AssertUnwindSafe(|| {
    let _ = with_lease(&repo, "inst-3", 30, || -> Result<(), FlowError> { panic!("worker died") });
  }));
  assert!(outcome.is_err());

  // the Drop guard released the lease despite the panic
  let again = with_lease(&repo, "inst-3", 30, || Ok(()));
  assert!(again.is_ok());
}

#[test]
fn expired_lease_can_be_reclaimed() {
  let repo = InMemoryFlowRepository::new();

  // ttl 0 expires immediately: a crashed holder must not block forever
  assert!(repo.acquire_lease("inst-4", 0, "dead-token").expect("acquire"));
  let result = with_lease(&repo, "inst-4", 30, || Ok("reclaimed"));
  assert_eq!(result.expect("reclaim succeeds"), "reclaimed");
}

#[test]
fn release_with_foreign_token_is_ignored() {
  let repo = InMemoryFlowRepository::new();

  assert!(repo.acquire_lease("inst-5", 30, "holder").expect("acquire"));
  repo.release_lease("inst-5", "someone-else").expect("release is a no-op");
  // still held by the original token
  assert!(!repo.acquire_lease("inst-5", 30, "intruder").expect("acquire"));
  repo.release_lease("inst-5", "holder").expect("release");
  assert!(repo.acquire_lease("inst-5", 30, "intruder").expect("acquire"));
}

#[test]
fn concurrent_holders_exactly_one_wins() {
  let repo = Arc::new(InMemoryFlowRepository::new());

  let winner = {
    let repo = repo.clone();
    thread::spawn(move || {
      with_lease(repo.as_ref(), "inst-6", 30, || {
        thread::sleep(Duration::from_millis(200));
        Ok(())
      })
    })
  };
  // give the winner time to acquire
  thread::sleep(Duration::from_millis(50));

  let loser = with_lease(repo.as_ref(), "inst-6", 30, || Ok(()));
  assert!(matches!(loser, Err(FlowError::LockUnavailable(_))));

  winner.join().expect("join").expect("winner completes");
  let after = with_lease(repo.as_ref(), "inst-6", 30, || Ok(()));
  assert!(after.is_ok());
}
