use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use super::Engine;
use crate::api::{BidAPI, DriverAPI, JobAPI, MatchAPI, SweepAPI};
use crate::auth::User;
use crate::config::{BiddingConfig, GeocoderConfig, MatchingConfig};
use crate::conflict::Commitment;
use crate::db::{MemoryStore, Store};
use crate::entities::job::fixtures::draft;
use crate::entities::{
    Bid, BidStatus, Coordinates, Driver, DriverProfile, Job, JobLedger, JobStatus, Location,
    Requirement, RequirementSet, Visibility,
};
use crate::error::{Error, ErrorKind};
use crate::geocoder::{Geocoder, PostcodeResolver};
use crate::notifier::{Notification, Notifier};

const STOCKPORT: Coordinates = Coordinates {
    lat: 53.4083,
    lng: -2.1494,
};

#[derive(Default)]
struct CountingResolver {
    calls: AtomicUsize,
}

#[async_trait]
impl PostcodeResolver for CountingResolver {
    async fn resolve(&self, _postcode: &str) -> Result<Option<Coordinates>, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some(STOCKPORT))
    }
}

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn titles_for(&self, recipient_id: Uuid) -> Vec<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|n| n.recipient_id == recipient_id)
            .map(|n| n.title_text.clone())
            .collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: Notification) -> Result<(), Error> {
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }
}

struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: Notification) -> Result<(), Error> {
        Err(Error::upstream_error())
    }
}

/// Delegates to a [`MemoryStore`] but fails every ledger transition on one
/// job.
struct BrokenLedgerStore {
    inner: MemoryStore,
    broken_job: Mutex<Option<Uuid>>,
}

impl BrokenLedgerStore {
    fn new() -> Self {
        Self {
            inner: MemoryStore::new(),
            broken_job: Mutex::new(None),
        }
    }

    fn break_job(&self, job_id: Uuid) {
        *self.broken_job.lock().unwrap() = Some(job_id);
    }
}

#[async_trait]
impl Store for BrokenLedgerStore {
    async fn insert_job(&self, job: &Job) -> Result<(), Error> {
        self.inner.insert_job(job).await
    }

    async fn find_job(&self, id: Uuid) -> Result<Job, Error> {
        self.inner.find_job(id).await
    }

    async fn open_jobs(&self) -> Result<Vec<Job>, Error> {
        self.inner.open_jobs().await
    }

    async fn insert_driver(&self, driver: &Driver) -> Result<(), Error> {
        self.inner.insert_driver(driver).await
    }

    async fn find_driver(&self, id: Uuid) -> Result<Driver, Error> {
        self.inner.find_driver(id).await
    }

    async fn approved_drivers(&self) -> Result<Vec<Driver>, Error> {
        self.inner.approved_drivers().await
    }

    async fn find_bid(&self, id: Uuid) -> Result<Bid, Error> {
        self.inner.find_bid(id).await
    }

    async fn driver_commitments(&self, driver_id: Uuid) -> Result<Vec<Commitment>, Error> {
        self.inner.driver_commitments(driver_id).await
    }

    async fn lapsed_bids(&self, now: DateTime<Utc>) -> Result<Vec<Bid>, Error> {
        self.inner.lapsed_bids(now).await
    }

    async fn with_ledger<T, F>(&self, job_id: Uuid, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut JobLedger) -> Result<T, Error> + Send,
        T: Send,
    {
        let broken = *self.broken_job.lock().unwrap() == Some(job_id);
        if broken {
            return Err(Error::new(ErrorKind::Database, "connection reset"));
        }
        self.inner.with_ledger(job_id, f).await
    }

    async fn with_driver<T, F>(&self, driver_id: Uuid, f: F) -> Result<T, Error>
    where
        F: FnOnce(&mut Driver) -> Result<T, Error> + Send,
        T: Send,
    {
        self.inner.with_driver(driver_id, f).await
    }
}

struct Harness<S: Store = MemoryStore> {
    engine: Engine<S>,
    resolver: Arc<CountingResolver>,
    notifier: Arc<RecordingNotifier>,
    owner: User,
}

fn harness_on<S: Store>(store: S, bidding: BiddingConfig) -> Harness<S> {
    let resolver = Arc::new(CountingResolver::default());
    let notifier = Arc::new(RecordingNotifier::default());

    let engine = Engine::new(
        store,
        Geocoder::new(resolver.clone(), &GeocoderConfig::default()),
        notifier.clone(),
        &MatchingConfig::default(),
        &bidding,
    )
    .unwrap();

    Harness {
        engine,
        resolver,
        notifier,
        owner: User::new(Uuid::new_v4()).with_organization(Uuid::new_v4()),
    }
}

fn harness_with(bidding: BiddingConfig) -> Harness {
    harness_on(MemoryStore::new(), bidding)
}

fn harness() -> Harness {
    harness_with(BiddingConfig::default())
}

fn system() -> User {
    User::new_system_user()
}

impl<S: Store> Harness<S> {
    async fn job(&self) -> Job {
        self.engine.create_job(self.owner.clone(), draft()).await.unwrap()
    }

    async fn driver_with(&self, profile: DriverProfile) -> User {
        let user = User::new(Uuid::new_v4());
        self.engine.create_driver(user.clone(), profile).await.unwrap();
        self.engine.approve_driver(system(), user.id, true).await.unwrap();
        user
    }

    async fn driver(&self) -> User {
        self.driver_with(DriverProfile {
            base_postcode: Some("SK3 0AA".into()),
            wheelchair_capacity: Some(1),
            ..Default::default()
        })
        .await
    }
}

#[tokio::test]
async fn accepting_a_bid_declines_its_competitors() {
    let h = harness();
    let job = h.job().await;
    let (d1, d2) = (h.driver().await, h.driver().await);

    let b1 = h.engine.create_bid(d1.clone(), job.id, 4000).await.unwrap().bid;
    let b2 = h.engine.create_bid(d2.clone(), job.id, 3500).await.unwrap().bid;

    let acceptance = h.engine.accept_bid(h.owner.clone(), b1.id).await.unwrap();
    assert_eq!(acceptance.accepted.id, b1.id);
    assert!(acceptance.accepted.expires_at().unwrap() > Utc::now());
    assert_eq!(acceptance.declined.len(), 1);
    assert_eq!(acceptance.declined[0].id, b2.id);

    let job = h.engine.find_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::BidAccepted);
    assert_eq!(job.accepted_bid_id, Some(b1.id));

    let b2 = h.engine.find_bid(d2.clone(), b2.id).await.unwrap();
    assert_eq!(b2.status, BidStatus::Declined);

    let err = h.engine.accept_bid(h.owner.clone(), b2.id).await.unwrap_err();
    assert!(err.is(ErrorKind::AlreadyDecided));

    assert_eq!(h.notifier.titles_for(d1.id), vec!["Bid accepted"]);
    assert_eq!(h.notifier.titles_for(d2.id), vec!["Bid declined"]);
}

#[tokio::test]
async fn only_the_owning_organization_accepts_bids() {
    let h = harness();
    let job = h.job().await;
    let driver = h.driver().await;
    let bid = h.engine.create_bid(driver.clone(), job.id, 4000).await.unwrap().bid;

    let outsider = User::new(Uuid::new_v4()).with_organization(Uuid::new_v4());
    let err = h.engine.accept_bid(outsider, bid.id).await.unwrap_err();
    assert!(err.is(ErrorKind::NotOwner));

    let err = h.engine.accept_bid(driver, bid.id).await.unwrap_err();
    assert!(err.is(ErrorKind::NotOwner));

    let err = h.engine.accept_bid(h.owner.clone(), Uuid::new_v4()).await.unwrap_err();
    assert!(err.is(ErrorKind::BidNotFound));
}

#[tokio::test]
async fn bid_creation_rejects_duplicates_and_bad_amounts() {
    let h = harness();
    let job = h.job().await;
    let driver = h.driver().await;

    let err = h.engine.create_bid(driver.clone(), job.id, 0).await.unwrap_err();
    assert!(err.is(ErrorKind::InvalidAmount));

    h.engine.create_bid(driver.clone(), job.id, 4000).await.unwrap();
    let err = h.engine.create_bid(driver.clone(), job.id, 3900).await.unwrap_err();
    assert!(err.is(ErrorKind::DuplicateBid));
}

#[tokio::test]
async fn unapproved_drivers_cannot_bid() {
    let h = harness();
    let job = h.job().await;

    let user = User::new(Uuid::new_v4());
    h.engine
        .create_driver(
            user.clone(),
            DriverProfile {
                base_postcode: Some("SK3 0AA".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let err = h.engine.create_bid(user, job.id, 4000).await.unwrap_err();
    assert!(err.is(ErrorKind::DriverNotEligible));
}

#[tokio::test]
async fn bids_past_the_daily_ceiling_are_refused() {
    let h = harness();
    let job = h.job().await;
    let driver = h
        .driver_with(DriverProfile {
            base_postcode: Some("SK3 0AA".into()),
            // the default job is estimated at 1.5 hours
            daily_capacity_hours: Some(1.0),
            ..Default::default()
        })
        .await;

    let err = h.engine.create_bid(driver.clone(), job.id, 4000).await.unwrap_err();
    assert!(err.is(ErrorKind::CapacityExceeded));

    let report = h
        .engine
        .preview_conflicts(driver.clone(), driver.id, job.id)
        .await
        .unwrap();
    assert!(!report.fits);
    assert_eq!(report.job_hours, 1.5);
}

#[tokio::test]
async fn overlapping_bids_are_reported_but_allowed() {
    let h = harness();
    let first = h.job().await;
    let second = h.job().await;
    let driver = h.driver().await;

    let receipt = h.engine.create_bid(driver.clone(), first.id, 4000).await.unwrap();
    assert!(receipt.conflicts.conflicts.is_empty());

    let receipt = h.engine.create_bid(driver.clone(), second.id, 4000).await.unwrap();
    assert_eq!(receipt.conflicts.conflicts.len(), 1);
    assert_eq!(receipt.conflicts.conflicts[0].job_id, first.id);
}

#[tokio::test]
async fn confirmation_moves_bid_and_job_together() {
    let h = harness();
    let job = h.job().await;
    let driver = h.driver().await;
    let bid = h.engine.create_bid(driver.clone(), job.id, 4000).await.unwrap().bid;
    h.engine.accept_bid(h.owner.clone(), bid.id).await.unwrap();

    let stranger = User::new(Uuid::new_v4());
    let err = h.engine.confirm_bid(stranger, bid.id).await.unwrap_err();
    assert!(err.is(ErrorKind::NotOwner));

    let confirmed = h.engine.confirm_bid(driver.clone(), bid.id).await.unwrap();
    assert!(matches!(confirmed.status, BidStatus::Confirmed { .. }));

    let job = h.engine.find_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Confirmed);
    assert_eq!(h.notifier.titles_for(h.owner.id), vec!["Booking confirmed"]);

    let job = h.engine.start_job(driver.clone(), job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::InProgress);

    let err = h.engine.complete_job(h.owner.clone(), job.id).await.unwrap_err();
    assert!(err.is(ErrorKind::NotOwner));

    let job = h.engine.complete_job(driver, job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
}

#[tokio::test]
async fn confirming_after_the_window_fails() {
    let h = harness_with(BiddingConfig {
        confirmation_window: Duration::milliseconds(10),
        ..Default::default()
    });
    let job = h.job().await;
    let driver = h.driver().await;
    let bid = h.engine.create_bid(driver.clone(), job.id, 4000).await.unwrap().bid;
    h.engine.accept_bid(h.owner.clone(), bid.id).await.unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let err = h.engine.confirm_bid(driver, bid.id).await.unwrap_err();
    assert!(err.is(ErrorKind::ConfirmationExpired));
}

#[tokio::test]
async fn sweep_expires_lapsed_acceptances_and_reopens_the_job() {
    let h = harness();
    let job = h.job().await;
    let (d1, d2) = (h.driver().await, h.driver().await);
    let b1 = h.engine.create_bid(d1.clone(), job.id, 4000).await.unwrap().bid;
    h.engine.create_bid(d2.clone(), job.id, 4100).await.unwrap();
    h.engine.accept_bid(h.owner.clone(), b1.id).await.unwrap();

    // nothing has lapsed yet
    let outcome = h.engine.sweep(Utc::now()).await.unwrap();
    assert_eq!(outcome.total_found, 0);

    let later = Utc::now() + Duration::hours(25);
    let outcome = h.engine.sweep(later).await.unwrap();
    assert_eq!(outcome.total_found, 1);
    assert_eq!(outcome.processed_count, 1);

    let bid = h.engine.find_bid(d1.clone(), b1.id).await.unwrap();
    assert_eq!(bid.status, BidStatus::Expired);

    let job = h.engine.find_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Open);
    assert_eq!(job.accepted_bid_id, None);

    assert_eq!(h.notifier.titles_for(h.owner.id), vec!["Confirmation lapsed"]);
    assert_eq!(h.notifier.titles_for(d2.id), vec!["Bid declined", "Job reopened"]);

    // a second run finds nothing to do
    let outcome = h.engine.sweep(later).await.unwrap();
    assert_eq!(outcome.total_found, 0);
    assert_eq!(outcome.processed_count, 0);
}

#[tokio::test]
async fn sweeping_over_the_api_needs_the_system_role() {
    let h = harness();

    let err = h.engine.trigger_sweep(h.owner.clone()).await.unwrap_err();
    assert!(err.is(ErrorKind::NotOwner));

    let outcome = h.engine.trigger_sweep(system()).await.unwrap();
    assert_eq!(outcome.total_found, 0);
}

#[tokio::test]
async fn withdrawing_pending_and_accepted_bids() {
    let h = harness();
    let job = h.job().await;
    let (d1, d2) = (h.driver().await, h.driver().await);
    let b1 = h.engine.create_bid(d1.clone(), job.id, 4000).await.unwrap().bid;

    let withdrawal = h.engine.withdraw_bid(d1.clone(), b1.id).await.unwrap();
    assert_eq!(withdrawal.bid.status, BidStatus::Withdrawn);
    assert!(!withdrawal.job_reopened);

    let unchanged = h.engine.find_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(unchanged.status, JobStatus::Open);

    let b2 = h.engine.create_bid(d2.clone(), job.id, 4000).await.unwrap().bid;
    h.engine.accept_bid(h.owner.clone(), b2.id).await.unwrap();

    let withdrawal = h.engine.withdraw_bid(d2.clone(), b2.id).await.unwrap();
    assert!(withdrawal.job_reopened);

    let job = h.engine.find_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Open);
    assert_eq!(job.accepted_bid_id, None);
    assert_eq!(h.notifier.titles_for(h.owner.id), vec!["Driver withdrew"]);

    // a withdrawn driver may bid again
    h.engine.create_bid(d1, job.id, 3800).await.unwrap();
}

#[tokio::test]
async fn canceling_declines_pending_bids() {
    let h = harness();
    let job = h.job().await;
    let driver = h.driver().await;
    let bid = h.engine.create_bid(driver.clone(), job.id, 4000).await.unwrap().bid;

    let job = h.engine.cancel_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Canceled);

    let bid = h.engine.find_bid(driver.clone(), bid.id).await.unwrap();
    assert_eq!(bid.status, BidStatus::Declined);
    assert_eq!(h.notifier.titles_for(driver.id), vec!["Job canceled"]);

    let err = h.engine.create_bid(driver, job.id, 4000).await.unwrap_err();
    assert!(err.is(ErrorKind::JobNotOpen));
}

#[tokio::test]
async fn deleted_jobs_disappear_from_matching_and_bidding() {
    let h = harness();
    let job = h.job().await;
    let driver = h.driver().await;

    let matches = h.engine.find_jobs_for_driver(driver.clone(), driver.id).await.unwrap();
    assert_eq!(matches.len(), 1);

    h.engine.delete_job(h.owner.clone(), job.id).await.unwrap();

    let matches = h.engine.find_jobs_for_driver(driver.clone(), driver.id).await.unwrap();
    assert!(matches.is_empty());

    let err = h.engine.create_bid(driver, job.id, 4000).await.unwrap_err();
    assert!(err.is(ErrorKind::JobNotFound));
}

#[tokio::test]
async fn confirmed_jobs_cannot_be_deleted() {
    let h = harness();
    let job = h.job().await;
    let driver = h.driver().await;
    let bid = h.engine.create_bid(driver.clone(), job.id, 4000).await.unwrap().bid;
    h.engine.accept_bid(h.owner.clone(), bid.id).await.unwrap();
    h.engine.confirm_bid(driver, bid.id).await.unwrap();

    let err = h.engine.delete_job(h.owner.clone(), job.id).await.unwrap_err();
    assert!(err.is(ErrorKind::InvalidState));
}

#[tokio::test]
async fn malformed_postcodes_fail_before_geocoding() {
    let h = harness();

    for postcode in ["INVALID", "12345"] {
        let mut draft = draft();
        draft.pickup_postcode = postcode.into();

        let err = h.engine.create_job(h.owner.clone(), draft).await.unwrap_err();
        assert!(err.is(ErrorKind::InvalidFormat));
    }

    assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 0);

    h.job().await;
    assert_eq!(h.resolver.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn jobs_need_an_organization() {
    let h = harness();

    let err = h.engine.create_job(User::new(Uuid::new_v4()), draft()).await.unwrap_err();
    assert!(err.is(ErrorKind::NotOwner));
}

#[tokio::test]
async fn organization_scoped_jobs_are_hidden_from_other_drivers() {
    let h = harness();

    let mut scoped = draft();
    scoped.visibility = Visibility::Organization {
        organization_id: h.owner.organizations[0],
    };
    let job = h.engine.create_job(h.owner.clone(), scoped).await.unwrap();
    let driver = h.driver().await;

    let matches = h.engine.find_jobs_for_driver(driver.clone(), driver.id).await.unwrap();
    assert!(matches.is_empty());

    let err = h.engine.create_bid(driver, job.id, 4000).await.unwrap_err();
    assert!(err.is(ErrorKind::JobNotFound));
}

#[tokio::test]
async fn unchanged_pool_is_served_from_cache() {
    let h = harness();
    let job = h.job().await;
    let first = h.driver().await;

    let matches = h.engine.find_drivers_for_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].driver_id, first.id);

    // written behind the engine's back, so nothing invalidates
    let mut hidden = Driver::new(Uuid::new_v4());
    hidden.base = Some(Location::new("SK3 0AA".into(), STOCKPORT));
    hidden.approved = true;
    h.engine.store.insert_driver(&hidden).await.unwrap();

    let cached = h.engine.find_drivers_for_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(cached, matches);
}

#[tokio::test]
async fn capability_changes_are_reflected_immediately() {
    let h = harness();

    let mut wants_quiet = draft();
    wants_quiet.requirements = RequirementSet::from([Requirement::QuietRide]);
    let job = h.engine.create_job(h.owner.clone(), wants_quiet).await.unwrap();
    let driver = h.driver().await;

    let before = h.engine.find_drivers_for_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(before[0].accessibility_score, 0.0);
    assert_eq!(before[0].missing_requirements, vec![Requirement::QuietRide]);

    h.engine
        .update_driver(
            driver.clone(),
            driver.id,
            DriverProfile {
                capabilities: Some(RequirementSet::from([Requirement::QuietRide])),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let after = h.engine.find_drivers_for_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(after[0].accessibility_score, 1.0);
    assert!(after[0].missing_requirements.is_empty());
}

#[tokio::test]
async fn requirement_updates_invalidate_the_job() {
    let h = harness();
    let job = h.job().await;
    h.driver().await;

    let before = h.engine.find_drivers_for_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(before[0].accessibility_score, 1.0);

    h.engine
        .update_job_requirements(
            h.owner.clone(),
            job.id,
            RequirementSet::from([Requirement::OxygenEquipment]),
        )
        .await
        .unwrap();

    let after = h.engine.find_drivers_for_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(after[0].accessibility_score, 0.0);
}

#[tokio::test]
async fn notification_failures_do_not_undo_transitions() {
    let store = MemoryStore::new();
    let engine = Engine::new(
        store,
        Geocoder::new(Arc::new(CountingResolver::default()), &GeocoderConfig::default()),
        Arc::new(FailingNotifier),
        &MatchingConfig::default(),
        &BiddingConfig::default(),
    )
    .unwrap();

    let owner = User::new(Uuid::new_v4()).with_organization(Uuid::new_v4());
    let job = engine.create_job(owner.clone(), draft()).await.unwrap();

    let driver = User::new(Uuid::new_v4());
    engine
        .create_driver(
            driver.clone(),
            DriverProfile {
                base_postcode: Some("SK3 0AA".into()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    engine.approve_driver(system(), driver.id, true).await.unwrap();

    let bid = engine.create_bid(driver, job.id, 4000).await.unwrap().bid;
    let acceptance = engine.accept_bid(owner, bid.id).await.unwrap();
    assert!(matches!(acceptance.accepted.status, BidStatus::Accepted { .. }));
}

#[tokio::test]
async fn concurrent_acceptances_have_one_winner() {
    let h = harness();
    let job = h.job().await;
    let (d1, d2) = (h.driver().await, h.driver().await);
    let b1 = h.engine.create_bid(d1, job.id, 4000).await.unwrap().bid;
    let b2 = h.engine.create_bid(d2, job.id, 3500).await.unwrap().bid;

    let (first, second) = tokio::join!(
        h.engine.accept_bid(h.owner.clone(), b1.id),
        h.engine.accept_bid(h.owner.clone(), b2.id),
    );

    let (winner, loser) = match (first, second) {
        (Ok(acceptance), Err(err)) | (Err(err), Ok(acceptance)) => (acceptance, err),
        (first, second) => panic!("expected exactly one winner: {:?} {:?}", first, second),
    };
    assert!(loser.is(ErrorKind::AlreadyDecided));

    let job = h.engine.find_job(h.owner.clone(), job.id).await.unwrap();
    assert_eq!(job.accepted_bid_id, Some(winner.accepted.id));
}

#[tokio::test]
async fn one_failed_expiry_does_not_stop_the_sweep() {
    let h = harness_on(BrokenLedgerStore::new(), BiddingConfig::default());
    let (broken, healthy) = (h.job().await, h.job().await);
    let (d1, d2) = (h.driver().await, h.driver().await);

    let stuck = h.engine.create_bid(d1.clone(), broken.id, 4000).await.unwrap().bid;
    let lapsing = h.engine.create_bid(d2.clone(), healthy.id, 4000).await.unwrap().bid;
    h.engine.accept_bid(h.owner.clone(), stuck.id).await.unwrap();
    h.engine.accept_bid(h.owner.clone(), lapsing.id).await.unwrap();

    h.engine.store.break_job(broken.id);

    let outcome = h.engine.sweep(Utc::now() + Duration::hours(25)).await.unwrap();
    assert_eq!(outcome.total_found, 2);
    assert_eq!(outcome.processed_count, 1);

    let stuck = h.engine.find_bid(d1, stuck.id).await.unwrap();
    assert!(matches!(stuck.status, BidStatus::Accepted { .. }));

    let lapsing = h.engine.find_bid(d2, lapsing.id).await.unwrap();
    assert_eq!(lapsing.status, BidStatus::Expired);

    let healthy = h.engine.find_job(h.owner.clone(), healthy.id).await.unwrap();
    assert_eq!(healthy.status, JobStatus::Open);
}

#[tokio::test]
async fn drivers_cannot_join_organizations_themselves() {
    let h = harness();
    let organization_id = h.owner.organizations[0];

    let mut scoped = draft();
    scoped.visibility = Visibility::Organization { organization_id };
    let job = h.engine.create_job(h.owner.clone(), scoped).await.unwrap();

    let outsider = h.driver().await;
    let err = h
        .engine
        .update_driver(
            outsider.clone(),
            outsider.id,
            DriverProfile {
                organizations: Some(vec![organization_id]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotOwner));

    let user = User::new(Uuid::new_v4());
    let err = h
        .engine
        .create_driver(
            user,
            DriverProfile {
                base_postcode: Some("SK3 0AA".into()),
                organizations: Some(vec![organization_id]),
                ..Default::default()
            },
        )
        .await
        .unwrap_err();
    assert!(err.is(ErrorKind::NotOwner));

    let matches = h.engine.find_jobs_for_driver(outsider.clone(), outsider.id).await.unwrap();
    assert!(matches.is_empty());
    let err = h.engine.create_bid(outsider.clone(), job.id, 4000).await.unwrap_err();
    assert!(err.is(ErrorKind::JobNotFound));

    // the system may assign membership
    let driver = h
        .engine
        .update_driver(
            system(),
            outsider.id,
            DriverProfile {
                organizations: Some(vec![organization_id]),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(driver.organizations, vec![organization_id]);

    let matches = h.engine.find_jobs_for_driver(outsider.clone(), outsider.id).await.unwrap();
    assert_eq!(matches.len(), 1);
    h.engine.create_bid(outsider, job.id, 4000).await.unwrap();
}

#[tokio::test]
async fn drivers_registered_under_an_organization_see_its_jobs() {
    let h = harness();
    let organization_id = h.owner.organizations[0];

    let mut scoped = draft();
    scoped.visibility = Visibility::Organization { organization_id };
    let job = h.engine.create_job(h.owner.clone(), scoped).await.unwrap();

    let member = User::new(Uuid::new_v4()).with_organization(organization_id);
    let driver = h
        .engine
        .create_driver(
            member.clone(),
            DriverProfile {
                base_postcode: Some("SK3 0AA".into()),
                wheelchair_capacity: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(driver.organizations, vec![organization_id]);
    h.engine.approve_driver(system(), member.id, true).await.unwrap();

    h.engine.create_bid(member, job.id, 4000).await.unwrap();
}

#[tokio::test]
async fn drivers_without_a_base_cannot_bid() {
    let h = harness();
    let job = h.job().await;
    let driver = h.driver_with(DriverProfile::default()).await;

    let err = h.engine.create_bid(driver, job.id, 4000).await.unwrap_err();
    assert!(err.is(ErrorKind::DriverNotEligible));
}
