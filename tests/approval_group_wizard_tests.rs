mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{selection, users, RecordingApprovalApi};
use docflow_wizards::{
    api::MemoryBackend,
    domain::{ApprovalGroup, RuleType},
    errors::{ApiError, WizardError},
    flows::{approval_group::ELIGIBLE_USERS, ApprovalGroupFlow},
    wizard::{
        Action, CheckStatus, NoticeLevel, RecordingNotifier, StepOutcome, SubmitOutcome, Wizard,
    },
};

const DEBOUNCE: Duration = Duration::from_millis(50);

fn wizard(api: Arc<RecordingApprovalApi>) -> Wizard<ApprovalGroupFlow> {
    Wizard::new(ApprovalGroupFlow::new_create(api)).with_debounce(DEBOUNCE)
}

fn fill_details(wizard: &Wizard<ApprovalGroupFlow>, name: &str) {
    wizard.set("name", name).unwrap();
    wizard.set("description", "Invoices above threshold").unwrap();
}

/// Details and rule filled in, users step active.
async fn at_users_step(wizard: &Wizard<ApprovalGroupFlow>) {
    wizard.open().await;
    fill_details(wizard, "Finance Approvals");
    assert_eq!(wizard.next().await.unwrap(), StepOutcome::Advanced(2));
    wizard.set("rule_type", RuleType::Sequential.label()).unwrap();
    assert_eq!(wizard.next().await.unwrap(), StepOutcome::Advanced(3));
}

#[tokio::test(start_paused = true)]
async fn single_user_is_rejected_then_two_users_submit_in_selection_order() {
    let api = Arc::new(RecordingApprovalApi::new(users()));
    let wizard = wizard(Arc::clone(&api));
    at_users_step(&wizard).await;

    let people = users();
    assert_eq!(wizard.options(ELIGIBLE_USERS).len(), 4);

    wizard.set("users", selection(&[&people[2]])).unwrap();
    match wizard.next().await.unwrap() {
        StepOutcome::Rejected(errors) => {
            assert_eq!(errors.error("users"), Some("Select at least 2 users"));
        }
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(wizard.current_step(), 3);
    assert_eq!(wizard.errors().error("users"), Some("Select at least 2 users"));

    wizard
        .set("users", selection(&[&people[2], &people[0]]))
        .unwrap();
    assert!(wizard.errors().is_valid());
    assert_eq!(wizard.next().await.unwrap(), StepOutcome::Advanced(4));

    let group = match wizard.submit().await.unwrap() {
        SubmitOutcome::Completed(group) => group,
        other => panic!("expected completion, got {:?}", other),
    };
    let ids: Vec<_> = group.users.iter().map(|user| user.id).collect();
    assert_eq!(ids, vec![3, 1]);

    let created = api.created();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].user_ids, vec![3, 1]);
    assert_eq!(created[0].rule_type, RuleType::Sequential);
    assert!(!wizard.is_open());
}

#[tokio::test(start_paused = true)]
async fn review_step_rechecks_cardinality() {
    let api = Arc::new(RecordingApprovalApi::new(users()));
    let wizard = wizard(Arc::clone(&api));
    at_users_step(&wizard).await;
    let people = users();
    wizard
        .set("users", selection(&[&people[0], &people[1]]))
        .unwrap();
    assert_eq!(wizard.next().await.unwrap(), StepOutcome::Advanced(4));

    // Members dropped behind the wizard's back (e.g. by an embedding UI).
    wizard.set("users", selection(&[&people[0]])).unwrap();
    match wizard.submit().await.unwrap() {
        SubmitOutcome::Rejected(errors) => assert_eq!(
            errors.error("users"),
            Some("Cannot create an approval group with less than 2 users")
        ),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(api.create_calls.load(std::sync::atomic::Ordering::SeqCst), 0);
    assert!(wizard.is_open());
}

#[tokio::test(start_paused = true)]
async fn navigation_respects_step_bounds() {
    let api = Arc::new(RecordingApprovalApi::new(users()));
    let wizard = wizard(api);

    assert!(matches!(wizard.set("name", "x"), Err(WizardError::Closed)));
    assert!(matches!(wizard.next().await, Err(WizardError::Closed)));

    wizard.open().await;
    assert_eq!(wizard.back().unwrap(), 1);
    assert!(matches!(wizard.submit().await, Err(WizardError::NotTerminal)));

    at_users_step(&wizard).await;
    let people = users();
    wizard
        .set("users", selection(&[&people[0], &people[1]]))
        .unwrap();
    assert_eq!(wizard.next().await.unwrap(), StepOutcome::Advanced(4));
    assert!(wizard.is_terminal());
    assert!(matches!(wizard.next().await, Err(WizardError::TerminalStep)));

    assert_eq!(wizard.back().unwrap(), 3);
    let progress = wizard.progress();
    assert!(progress[0].complete && progress[1].complete);
    assert!(progress[2].active && !progress[3].complete);
}

#[tokio::test(start_paused = true)]
async fn primary_action_advances_then_submits() {
    let api = Arc::new(RecordingApprovalApi::new(users()));
    let wizard = wizard(Arc::clone(&api));
    at_users_step(&wizard).await;
    let people = users();
    wizard
        .set("users", selection(&[&people[1], &people[3]]))
        .unwrap();

    assert_eq!(
        wizard.primary_action().await.unwrap(),
        Action::Step(StepOutcome::Advanced(4))
    );
    match wizard.primary_action().await.unwrap() {
        Action::Submit(SubmitOutcome::Completed(group)) => assert_eq!(group.name, "Finance Approvals"),
        other => panic!("expected submission, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn stale_probe_superseded_before_it_is_sent() {
    let api = Arc::new(RecordingApprovalApi::new(users()).with_name("B", false, Duration::ZERO));
    let wizard = wizard(Arc::clone(&api));
    wizard.open().await;

    wizard.set("name", "A").unwrap();
    let (first, second) = tokio::join!(wizard.check_field("name"), async {
        tokio::time::sleep(DEBOUNCE / 2).await;
        wizard.set("name", "B").unwrap();
        wizard.check_field("name").await
    });

    assert_eq!(first.unwrap(), None);
    let second = second.unwrap().expect("latest probe applies");
    assert_eq!(second.status, CheckStatus::Invalid);
    assert_eq!(api.probed(), vec!["B".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn late_response_for_old_input_is_discarded() {
    let api = Arc::new(
        RecordingApprovalApi::new(users())
            .with_name("A", true, Duration::from_millis(500))
            .with_name("B", false, Duration::from_millis(10)),
    );
    let wizard = wizard(Arc::clone(&api));
    wizard.open().await;

    wizard.set("name", "A").unwrap();
    let (first, second) = tokio::join!(wizard.check_field("name"), async {
        // Past the debounce, so the probe for "A" is already in flight.
        tokio::time::sleep(DEBOUNCE * 2).await;
        wizard.set("name", "B").unwrap();
        wizard.check_field("name").await
    });

    assert_eq!(first.unwrap(), None, "the slow answer for A must not apply");
    assert_eq!(second.unwrap().map(|result| result.status), Some(CheckStatus::Invalid));
    assert_eq!(api.probed(), vec!["A".to_string(), "B".to_string()]);

    let status = wizard.check_status("name").expect("status for B");
    assert_eq!(status.status, CheckStatus::Invalid);
    assert_eq!(
        wizard.errors().error("name"),
        Some("An approval group named 'B' already exists")
    );
}

#[tokio::test(start_paused = true)]
async fn next_waits_for_the_running_name_check() {
    let api = Arc::new(RecordingApprovalApi::new(users()).with_name(
        "Finance",
        true,
        Duration::from_millis(500),
    ));
    let wizard = wizard(Arc::clone(&api));
    wizard.open().await;
    fill_details(&wizard, "Finance");

    let (checked, advanced) = tokio::join!(wizard.check_field("name"), async {
        // The name check is already on the wire.
        tokio::time::sleep(Duration::from_millis(100)).await;
        wizard.next().await
    });

    assert_eq!(
        checked.unwrap().map(|result| result.status),
        Some(CheckStatus::Valid)
    );
    assert_eq!(advanced.unwrap(), StepOutcome::Advanced(2));
    assert_eq!(api.probed(), vec!["Finance".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn double_clicked_next_checks_the_name_once() {
    let notifier = Arc::new(RecordingNotifier::new());
    let api = Arc::new(RecordingApprovalApi::new(users()).with_name(
        "Finance",
        true,
        Duration::from_millis(200),
    ));
    let wizard = wizard(Arc::clone(&api)).with_notifier(notifier.clone());
    wizard.open().await;
    fill_details(&wizard, "Finance");

    let other = wizard.clone();
    let (first, second) = tokio::join!(wizard.next(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        other.next().await
    });

    let mut outcomes = vec![first.unwrap(), second.unwrap()];
    outcomes.sort_by_key(|outcome| matches!(outcome, StepOutcome::Interrupted));
    assert_eq!(
        outcomes,
        vec![StepOutcome::Advanced(2), StepOutcome::Interrupted]
    );
    assert_eq!(wizard.current_step(), 2);
    assert_eq!(api.probed(), vec!["Finance".to_string()]);
    assert_eq!(notifier.count(NoticeLevel::Warning), 0);
}

#[tokio::test(start_paused = true)]
async fn taken_name_blocks_the_details_step() {
    let api = Arc::new(RecordingApprovalApi::new(users()).with_name("Finance", false, Duration::ZERO));
    let wizard = wizard(api);
    wizard.open().await;
    fill_details(&wizard, "finance");

    // No probe was issued yet; next() runs it before deciding.
    match wizard.next().await.unwrap() {
        StepOutcome::Rejected(errors) => assert_eq!(
            errors.error("name"),
            Some("An approval group named 'finance' already exists")
        ),
        other => panic!("expected rejection, got {:?}", other),
    }
    assert_eq!(wizard.current_step(), 1);
}

#[tokio::test(start_paused = true)]
async fn failed_probe_counts_as_invalid() {
    let api = Arc::new(
        RecordingApprovalApi::new(users()).with_probe_error(ApiError::Transport("timeout".into())),
    );
    let wizard = wizard(api);
    wizard.open().await;
    fill_details(&wizard, "Finance Approvals");

    let result = wizard.check_field("name").await.unwrap().unwrap();
    assert_eq!(result.status, CheckStatus::Invalid);
    assert_eq!(
        result.message.as_deref(),
        Some("Could not verify this value: Network error: timeout")
    );
    assert!(matches!(wizard.next().await.unwrap(), StepOutcome::Rejected(_)));
}

#[tokio::test(start_paused = true)]
async fn concurrent_submits_send_one_request() {
    let api = Arc::new(RecordingApprovalApi::new(users()).with_create_latency(Duration::from_millis(200)));
    let wizard = wizard(Arc::clone(&api));
    at_users_step(&wizard).await;
    let people = users();
    wizard
        .set("users", selection(&[&people[0], &people[1]]))
        .unwrap();
    wizard.next().await.unwrap();

    let other = wizard.clone();
    let (first, second) = tokio::join!(wizard.submit(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(other.is_submitting());
        other.submit().await
    });

    assert!(matches!(first.unwrap(), SubmitOutcome::Completed(_)));
    assert!(matches!(second.unwrap(), SubmitOutcome::AlreadyInFlight));
    assert_eq!(api.create_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert!(!wizard.is_submitting());
}

#[tokio::test(start_paused = true)]
async fn failed_submission_keeps_the_form_for_a_retry() {
    let notifier = Arc::new(RecordingNotifier::new());
    let api = Arc::new(RecordingApprovalApi::new(users()).failing(1));
    let wizard = wizard(Arc::clone(&api)).with_notifier(notifier.clone());
    at_users_step(&wizard).await;
    let people = users();
    wizard
        .set("users", selection(&[&people[0], &people[1]]))
        .unwrap();
    wizard.next().await.unwrap();

    let failure = wizard.submit().await;
    assert!(matches!(failure, Err(WizardError::Submission(ApiError::Transport(_)))));
    assert!(wizard.is_open());
    assert!(!wizard.is_submitting());
    assert_eq!(wizard.current_step(), 4);
    assert_eq!(wizard.value("name").to_string(), "Finance Approvals");
    assert_eq!(notifier.count(NoticeLevel::Error), 1);

    assert!(matches!(
        wizard.submit().await.unwrap(),
        SubmitOutcome::Completed(_)
    ));
    assert_eq!(api.created().len(), 1);
    assert_eq!(notifier.count(NoticeLevel::Success), 1);
}

#[tokio::test(start_paused = true)]
async fn option_fetch_resolving_after_reopen_is_dropped() {
    let backend = Arc::new(MemoryBackend::seeded().with_latency(Duration::from_millis(100)));
    let wizard = Wizard::new(ApprovalGroupFlow::new_create(backend)).with_debounce(DEBOUNCE);
    wizard.open().await;
    fill_details(&wizard, "Treasury");
    wizard.next().await.unwrap();
    assert_eq!(wizard.current_step(), 2);

    let (advanced, _) = tokio::join!(wizard.next(), async {
        // next() is now waiting on the eligible-user fetch.
        tokio::time::sleep(Duration::from_millis(50)).await;
        wizard.close();
        wizard.open().await;
    });

    assert!(matches!(advanced, Err(WizardError::Closed)));
    assert!(wizard.is_open());
    assert_eq!(wizard.current_step(), 1);
    assert!(wizard.options(ELIGIBLE_USERS).is_empty());
    assert!(wizard.value("name").is_blank());
}

#[tokio::test(start_paused = true)]
async fn editing_starts_from_the_group_and_updates_it() {
    let api = Arc::new(RecordingApprovalApi::new(users()));
    let people = users();
    let group = ApprovalGroup {
        id: 10,
        name: "Finance".into(),
        description: "Invoices above threshold".into(),
        comment: Some("Quarterly review".into()),
        rule_type: RuleType::All,
        users: vec![people[1].clone(), people[0].clone()],
    };
    let wizard = Wizard::new(ApprovalGroupFlow::new_edit(api.clone(), &group)).with_debounce(DEBOUNCE);
    wizard.open().await;

    for expected in [2, 3, 4] {
        assert_eq!(wizard.next().await.unwrap(), StepOutcome::Advanced(expected));
    }
    let summary = wizard.summary();
    assert!(summary
        .iter()
        .any(|line| line.label == "Approvers" && line.value == "Bruno Dupont, Alice Martin"));

    assert!(matches!(wizard.submit().await.unwrap(), SubmitOutcome::Completed(_)));
    let updated = api.updated.lock().unwrap().clone();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0].0, 10);
    assert_eq!(updated[0].1.user_ids, vec![2, 1]);
    assert_eq!(updated[0].1.comment.as_deref(), Some("Quarterly review"));
    assert!(api.created().is_empty());
}
