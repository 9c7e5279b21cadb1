//! Contract Test: Setup Wizard
//!
//! Verifies the two-step flow:
//! - credentials are trimmed and validated locally
//! - tracking numbers are parsed from comma/newline separated text
//! - exactly one validation fetch, for the first number only
//! - error mapping per validation policy
//! - the same set of tracking numbers cannot be configured twice

mod common;

use common::*;
use parcel_core::setup::{
    AbortReason, CredentialsInput, FormError, SetupFlow, SetupOptions, SetupStep, StepOutcome,
    TrackingInput, ValidationPolicy,
};
use parcel_core::store::MemoryConfigStore;
use parcel_core::traits::ConfigStore;
use std::sync::Arc;

fn flow(factory: &ScriptedFactory, store: &MemoryConfigStore, options: SetupOptions) -> SetupFlow {
    SetupFlow::new(Arc::new(factory.clone()), Arc::new(store.clone()), options)
}

fn credentials(key: &str) -> CredentialsInput {
    CredentialsInput {
        api_key: key.to_string(),
        api_secret: None,
        poll_interval_minutes: None,
    }
}

fn tracking(text: &str) -> TrackingInput {
    TrackingInput {
        tracking_numbers: text.to_string(),
    }
}

fn form_error(outcome: &StepOutcome) -> Option<FormError> {
    match outcome {
        StepOutcome::Form { error, .. } => *error,
        other => panic!("expected a form, got {:?}", other),
    }
}

fn form_step(outcome: &StepOutcome) -> SetupStep {
    match outcome {
        StepOutcome::Form { step, .. } => *step,
        other => panic!("expected a form, got {:?}", other),
    }
}

#[tokio::test]
async fn happy_path_creates_entry() {
    let source = ScriptedSource::new();
    source.set_status("123", "transit");
    let factory = ScriptedFactory::new(source.clone());
    let store = MemoryConfigStore::new();
    let mut flow = flow(&factory, &store, SetupOptions::default());

    assert_eq!(form_step(&flow.start()), SetupStep::Credentials);

    let outcome = flow.submit_credentials(CredentialsInput {
        api_key: "  my-key  ".to_string(),
        api_secret: Some("  my-secret ".to_string()),
        poll_interval_minutes: Some(60),
    });
    assert_eq!(form_step(&outcome), SetupStep::Tracking);
    assert_eq!(form_error(&outcome), None);

    let outcome = flow.submit_tracking(tracking("123, 456\n789")).await;
    let StepOutcome::Created(entry) = outcome else {
        panic!("expected an entry");
    };

    assert_eq!(entry.data.tracking_numbers, vec!["123", "456", "789"]);
    assert_eq!(entry.data.credentials.api_key, "my-key");
    assert_eq!(entry.data.credentials.api_secret.as_deref(), Some("my-secret"));
    assert_eq!(entry.data.poll_interval_minutes, 60);
    assert_eq!(entry.unique_id, "parcel_tracker_123_456_789");
    assert_eq!(entry.title, "DHL (3 shipments)");

    assert_eq!(source.calls(), vec!["123"], "only the first number is validated");
    assert_eq!(factory.credentials()[0].api_key, "my-key");
    assert!(store.contains(&entry.unique_id).await.unwrap());
}

#[tokio::test]
async fn empty_key_is_invalid_auth() {
    let factory = ScriptedFactory::default();
    let store = MemoryConfigStore::new();
    let mut flow = flow(&factory, &store, SetupOptions::default());

    let outcome = flow.submit_credentials(credentials("   "));
    assert_eq!(form_step(&outcome), SetupStep::Credentials);
    assert_eq!(form_error(&outcome), Some(FormError::InvalidAuth));
    assert_eq!(flow.step(), SetupStep::Credentials);
}

#[tokio::test]
async fn poll_interval_out_of_range_is_rejected() {
    let factory = ScriptedFactory::default();
    let store = MemoryConfigStore::new();
    let mut flow = flow(&factory, &store, SetupOptions::default());

    for minutes in [4, 721] {
        let outcome = flow.submit_credentials(CredentialsInput {
            api_key: "key".to_string(),
            api_secret: None,
            poll_interval_minutes: Some(minutes),
        });
        assert_eq!(form_error(&outcome), Some(FormError::InvalidPollInterval));
    }
}

#[tokio::test]
async fn default_interval_applies() {
    let source = ScriptedSource::new();
    source.set_status("1", "transit");
    let factory = ScriptedFactory::new(source);
    let store = MemoryConfigStore::new();
    let mut flow = flow(&factory, &store, SetupOptions::default());

    flow.submit_credentials(credentials("key"));
    let StepOutcome::Created(entry) = flow.submit_tracking(tracking("1")).await else {
        panic!("expected an entry");
    };
    assert_eq!(entry.data.poll_interval_minutes, 30);
    assert_eq!(entry.data.credentials.api_secret, None);
}

#[tokio::test]
async fn blank_tracking_text_is_missing_tracking_numbers() {
    let source = ScriptedSource::new();
    let factory = ScriptedFactory::new(source.clone());
    let store = MemoryConfigStore::new();
    let mut flow = flow(&factory, &store, SetupOptions::default());

    flow.submit_credentials(credentials("key"));
    let outcome = flow.submit_tracking(tracking("  ,  \n")).await;

    assert_eq!(form_step(&outcome), SetupStep::Tracking);
    assert_eq!(form_error(&outcome), Some(FormError::MissingTrackingNumbers));
    assert!(source.calls().is_empty(), "no validation without numbers");
}

#[tokio::test]
async fn rejected_credentials_stay_on_tracking_step() {
    let source = ScriptedSource::new();
    source.set("123", Reply::AuthError);
    let factory = ScriptedFactory::new(source.clone());
    let store = MemoryConfigStore::new();
    let mut flow = flow(&factory, &store, SetupOptions::default());

    flow.submit_credentials(credentials("bad-key"));
    let outcome = flow.submit_tracking(tracking("123")).await;

    assert_eq!(form_step(&outcome), SetupStep::Tracking);
    assert_eq!(form_error(&outcome), Some(FormError::InvalidAuth));
    assert!(store.is_empty().await);

    // Resubmitting after the provider accepts works without going back
    source.set_status("123", "transit");
    assert!(matches!(
        flow.submit_tracking(tracking("123")).await,
        StepOutcome::Created(_)
    ));
}

#[tokio::test]
async fn lenient_policy_ignores_request_errors() {
    let source = ScriptedSource::new();
    source.set("123", Reply::RequestError(404));
    let factory = ScriptedFactory::new(source);
    let store = MemoryConfigStore::new();
    let mut flow = flow(&factory, &store, SetupOptions::default());

    flow.submit_credentials(credentials("key"));
    assert!(matches!(
        flow.submit_tracking(tracking("123")).await,
        StepOutcome::Created(_)
    ));
}

#[tokio::test]
async fn strict_policy_reports_cannot_connect() {
    let source = ScriptedSource::new();
    source.set("123", Reply::RequestError(404));
    let factory = ScriptedFactory::new(source);
    let store = MemoryConfigStore::new();
    let options = SetupOptions {
        validation_policy: ValidationPolicy::Strict,
        ..SetupOptions::default()
    };
    let mut flow = flow(&factory, &store, options);

    flow.submit_credentials(credentials("key"));
    let outcome = flow.submit_tracking(tracking("123")).await;
    assert_eq!(form_error(&outcome), Some(FormError::CannotConnect));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn unexpected_error_is_unknown() {
    let source = ScriptedSource::new();
    source.set("123", Reply::Unexpected);
    let factory = ScriptedFactory::new(source);
    let store = MemoryConfigStore::new();
    let mut flow = flow(&factory, &store, SetupOptions::default());

    flow.submit_credentials(credentials("key"));
    let outcome = flow.submit_tracking(tracking("123")).await;
    assert_eq!(form_error(&outcome), Some(FormError::Unknown));
}

#[tokio::test]
async fn same_number_set_cannot_be_configured_twice() {
    let source = ScriptedSource::new();
    source.set_status("123", "transit");
    source.set_status("456", "transit");
    let factory = ScriptedFactory::new(source);
    let store = MemoryConfigStore::new();

    let mut first = flow(&factory, &store, SetupOptions::default());
    first.submit_credentials(credentials("key"));
    assert!(matches!(
        first.submit_tracking(tracking("123,456")).await,
        StepOutcome::Created(_)
    ));

    let mut second = flow(&factory, &store, SetupOptions::default());
    second.submit_credentials(credentials("other-key"));
    let outcome = second.submit_tracking(tracking("456\n123")).await;

    assert_eq!(outcome, StepOutcome::Aborted(AbortReason::AlreadyConfigured));
    assert_eq!(store.len().await, 1);
}

#[tokio::test]
async fn secret_is_ignored_when_not_offered() {
    let source = ScriptedSource::new();
    source.set_status("1", "transit");
    let factory = ScriptedFactory::new(source);
    let store = MemoryConfigStore::new();
    let options = SetupOptions {
        offer_secret: false,
        ..SetupOptions::default()
    };
    let mut flow = flow(&factory, &store, options);

    let StepOutcome::Form { fields, .. } = flow.start() else {
        panic!("expected a form");
    };
    assert!(fields.iter().all(|f| f.name != "api_secret"));

    flow.submit_credentials(CredentialsInput {
        api_key: "key".to_string(),
        api_secret: Some("secret".to_string()),
        poll_interval_minutes: None,
    });
    let StepOutcome::Created(entry) = flow.submit_tracking(tracking("1")).await else {
        panic!("expected an entry");
    };
    assert_eq!(entry.data.credentials.api_secret, None);
    assert_eq!(factory.credentials()[0].api_secret, None);
}

#[tokio::test]
async fn tracking_before_credentials_returns_to_first_step() {
    let factory = ScriptedFactory::default();
    let store = MemoryConfigStore::new();
    let mut flow = flow(&factory, &store, SetupOptions::default());

    let outcome = flow.submit_tracking(tracking("123")).await;
    assert_eq!(form_step(&outcome), SetupStep::Credentials);
    assert!(factory.credentials().is_empty());
}
