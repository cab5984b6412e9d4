//! Session feed tests over a SQLite-backed engine

use boothxp_common::events::{EventBus, RewardEvent};
use boothxp_common::time::FixedClock;
use boothxp_common::RewardConfig;
use boothxp_engine::collaborators::UserStore;
use boothxp_engine::session::{Accounts, Session, SessionCommand};
use boothxp_engine::store::{MemoryBooth, MemoryPresence, SqliteUserStore};
use boothxp_engine::{EngineParts, RewardEngine};
use chrono::NaiveDate;
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

async fn sqlite_session() -> (Session, SqliteUserStore, broadcast::Receiver<RewardEvent>) {
    let store = SqliteUserStore::in_memory().await.unwrap();
    let accounts = Accounts::Sqlite(store.clone());
    let presence = Arc::new(MemoryPresence::new());
    let booth = Arc::new(MemoryBooth::new());
    let bus = EventBus::new(100);
    let rx = bus.subscribe();

    let engine = Arc::new(RewardEngine::new(EngineParts {
        config: RewardConfig::default(),
        users: accounts.store(),
        presence: presence.clone(),
        booth: booth.clone(),
        events: bus,
        clock: Arc::new(FixedClock::new(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap())),
        rng_seed: Some(7),
    }));

    (Session::new(engine, accounts, presence, booth), store, rx)
}

fn command(line: String) -> SessionCommand {
    SessionCommand::parse(&line).unwrap()
}

#[tokio::test]
async fn test_feed_rewards_presenter_and_persists() {
    let (session, store, mut rx) = sqlite_session().await;
    let dj = Uuid::new_v4();

    session
        .apply(command(format!(r#"{{"type":"CreateUser","user_id":"{}"}}"#, dj)))
        .await
        .unwrap();
    session
        .apply(command(format!(r#"{{"type":"Join","user_id":"{}"}}"#, dj)))
        .await
        .unwrap();
    session
        .apply(command(format!(
            r#"{{"type":"Advance","previous":{{"presenter_id":"{}","approvals":3,"disapprovals":1,"favorites":2}}}}"#,
            dj
        )))
        .await
        .unwrap();

    assert_eq!(
        rx.try_recv().unwrap(),
        RewardEvent::UserGain { user_id: dj, exp: 6, points: 0 }
    );

    let stored = store.get_user(dj).await.unwrap().unwrap();
    assert_eq!(stored.exp, 6);
    assert!(session.engine().scheduler().is_pending(dj));

    session
        .apply(command(format!(r#"{{"type":"Leave","user_id":"{}"}}"#, dj)))
        .await
        .unwrap();
    assert!(!session.engine().scheduler().is_pending(dj));
    session.engine().shutdown();
}

#[tokio::test]
async fn test_create_user_keeps_existing_record() {
    let (session, store, _rx) = sqlite_session().await;
    let id = Uuid::new_v4();

    session.apply(SessionCommand::CreateUser { user_id: id }).await.unwrap();
    session
        .apply(SessionCommand::Gain { user_id: id, points: 30, exp: 0 })
        .await
        .unwrap();
    session.apply(SessionCommand::CreateUser { user_id: id }).await.unwrap();

    assert_eq!(store.count().await.unwrap(), 1);
    assert_eq!(store.get_user(id).await.unwrap().unwrap().points, 30);
}

#[tokio::test]
async fn test_gain_for_unknown_user_fails() {
    let (session, _store, mut rx) = sqlite_session().await;
    let result = session
        .apply(SessionCommand::Gain { user_id: Uuid::new_v4(), points: 5, exp: 5 })
        .await;

    assert!(matches!(result, Err(boothxp_common::Error::UserNotFound(_))));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_waitlisted_dispensation_uses_multipliers() {
    let (session, _store, _rx) = sqlite_session().await;
    let id = Uuid::new_v4();

    session.apply(SessionCommand::CreateUser { user_id: id }).await.unwrap();
    session
        .apply(SessionCommand::SetWaitlist { users: vec![id] })
        .await
        .unwrap();

    match session.engine().dispense(id).await.unwrap() {
        boothxp_engine::dispenser::DispenseOutcome::Granted {
            exp,
            points,
            participating,
            ..
        } => {
            assert!(participating);
            assert!((7..=10).contains(&exp));
            assert!((18..=24).contains(&points));
        }
        other => panic!("expected a grant, got {:?}", other),
    }
}
