use crate::{
    db::{Db, Table},
    error::ErrorKind,
    feed::{BroadcastChannel, ChatLog, FeedError, MessageService, NotificationChannel},
    model::{Enrollment, Principal, Role},
    test_support::{UnavailableStore, course, memory_db, registry, seed_course},
    types::{CourseId, PrincipalId},
};
use futures::StreamExt;
use rehasport_config::FeedConfig;
use std::{sync::Arc, time::Duration};

fn service(db: Db) -> (Arc<BroadcastChannel>, MessageService) {
    let channel = Arc::new(BroadcastChannel::new(16));
    let service = MessageService::new(db, channel.clone(), &FeedConfig::default());

    (channel, service)
}

fn sender() -> Principal {
    Principal::new("p1", Role::Patient)
}

async fn join(db: &Db, course_id: &str, patient: &str) {
    let row = Enrollment::new(CourseId::new(course_id), PrincipalId::new(patient));
    db.insert(&row).await.expect("enrollment seed should succeed");
}

#[tokio::test]
async fn posted_messages_are_stored_trimmed_and_ordered() {
    let (_, db) = memory_db();
    seed_course(&db, "c1", 4, 0).await;
    seed_course(&db, "c2", 4, 0).await;
    join(&db, "c1", "p1").await;
    join(&db, "c2", "p1").await;
    let (_, messages) = service(db);

    for (course, text) in [("c1", "  first "), ("c2", "elsewhere"), ("c1", "second")] {
        messages
            .post(&sender(), &CourseId::new(course), text)
            .await
            .expect("post should succeed");
    }

    let history = messages
        .history(&sender(), &CourseId::new("c1"))
        .await
        .expect("history should load");
    let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["first", "second"]);
}

#[tokio::test]
async fn invalid_posts_are_rejected() {
    let (_, db) = memory_db();
    seed_course(&db, "c1", 4, 0).await;
    join(&db, "c1", "p1").await;
    let channel = Arc::new(BroadcastChannel::new(4));
    let config = FeedConfig {
        max_message_len: 5,
        ..FeedConfig::default()
    };
    let messages = MessageService::new(db, channel, &config);

    let err = messages
        .post(&sender(), &CourseId::new("c1"), "   ")
        .await
        .expect_err("blank message");
    assert!(matches!(err, FeedError::EmptyMessage));

    let err = messages
        .post(&sender(), &CourseId::new("c1"), "too long")
        .await
        .expect_err("long message");
    assert!(matches!(err, FeedError::MessageTooLong { len: 8, max: 5 }));
    assert_eq!(err.kind(), ErrorKind::Validation);

    let err = messages
        .post(&sender(), &CourseId::new("nope"), "hi")
        .await
        .expect_err("unknown course");
    assert!(matches!(err, FeedError::CourseNotFound { .. }));
}

#[tokio::test]
async fn subscribers_see_only_their_course_once() {
    let (_, db) = memory_db();
    seed_course(&db, "c1", 4, 0).await;
    seed_course(&db, "c2", 4, 0).await;
    join(&db, "c1", "p1").await;
    join(&db, "c2", "p1").await;
    let (channel, messages) = service(db);
    let mut feed = messages
        .subscribe(&sender(), &CourseId::new("c1"))
        .await
        .expect("member may subscribe");

    let posted = messages
        .post(&sender(), &CourseId::new("c1"), "hello")
        .await
        .expect("post should succeed");
    messages
        .post(&sender(), &CourseId::new("c2"), "other course")
        .await
        .expect("post should succeed");
    // Redelivery of the same row.
    channel.publish(&posted);
    let last = messages
        .post(&sender(), &CourseId::new("c1"), "again")
        .await
        .expect("post should succeed");

    let first = feed.next().await.expect("feed should yield");
    let second = feed.next().await.expect("feed should yield");
    assert_eq!(first.id, posted.id);
    assert_eq!(second.id, last.id);

    let pending = tokio::time::timeout(Duration::from_millis(20), feed.next()).await;
    assert!(pending.is_err(), "no further messages expected");

    let mut log = ChatLog::new();
    log.extend([second, first]);
    let ids: Vec<_> = log.iter().map(|m| m.id.clone()).collect();
    assert_eq!(ids, [posted.id, last.id]);
}

#[tokio::test]
async fn lagged_subscriber_skips_and_continues() {
    let (_, db) = memory_db();
    seed_course(&db, "c1", 4, 0).await;
    join(&db, "c1", "p1").await;
    let metrics = registry();
    let channel = Arc::new(BroadcastChannel::new(2).with_sink(metrics.clone()));
    let messages = MessageService::new(db, channel, &FeedConfig::default());
    let mut feed = messages
        .subscribe(&sender(), &CourseId::new("c1"))
        .await
        .expect("member may subscribe");

    for i in 0..5 {
        messages
            .post(&sender(), &CourseId::new("c1"), &format!("m{i}"))
            .await
            .expect("post should succeed");
    }

    let next = feed.next().await.expect("feed should resume after lag");
    assert_eq!(next.content, "m3");
    let counters = metrics.report(None).counters.expect("counters");
    assert_eq!(counters.subscriber_lagged, 3);
}

#[tokio::test]
async fn missing_messages_table_renders_empty_history() {
    let (store, db) = memory_db();
    seed_course(&db, "c1", 4, 0).await;
    join(&db, "c1", "p1").await;
    store.drop_table(Table::Messages).await;
    let (_, messages) = service(db);

    let history = messages
        .history(&sender(), &CourseId::new("c1"))
        .await
        .expect("advisory history should degrade");
    assert!(history.is_empty());

    let err = messages
        .post(&sender(), &CourseId::new("c1"), "hello")
        .await
        .expect_err("writes still fail");
    assert!(matches!(err, FeedError::Store(ref inner) if inner.is_table_missing()));
}

#[tokio::test]
async fn outages_are_not_masked_as_empty_history() {
    let (_, messages) = service(Db::new(Arc::new(UnavailableStore)));

    let err = messages
        .history(&sender(), &CourseId::new("c1"))
        .await
        .expect_err("outage should propagate");
    assert!(err.is_retryable());
}

#[tokio::test]
async fn outsiders_cannot_use_a_course_chat() {
    let (_, db) = memory_db();
    seed_course(&db, "c1", 4, 0).await;
    seed_course(&db, "c2", 4, 0).await;
    join(&db, "c2", "p1").await;
    let (_, messages) = service(db);
    let c1 = CourseId::new("c1");
    let trainer = Principal::new("t9", Role::Trainer);

    for outsider in [sender(), trainer] {
        let err = messages
            .post(&outsider, &c1, "hello")
            .await
            .expect_err("outsider may not post");
        assert!(matches!(err, FeedError::Forbidden { .. }));
        assert_eq!(err.kind(), ErrorKind::Authorization);

        let err = messages
            .history(&outsider, &c1)
            .await
            .expect_err("outsider may not read");
        assert!(matches!(err, FeedError::Forbidden { .. }));

        let err = messages
            .subscribe(&outsider, &c1)
            .await
            .err()
            .expect("outsider may not subscribe");
        assert!(matches!(err, FeedError::Forbidden { .. }));
    }
}

#[tokio::test]
async fn members_instructors_and_admins_share_the_room() {
    let (_, db) = memory_db();
    let mut instructed = course("c1", 4, 0);
    instructed.instructor_id = Some(PrincipalId::new("t1"));
    db.insert(&instructed).await.expect("course seed should succeed");
    seed_course(&db, "c2", 4, 0).await;
    join(&db, "c1", "p1").await;
    let (_, messages) = service(db);
    let c1 = CourseId::new("c1");
    let instructor = Principal::new("t1", Role::Trainer);
    let admin = Principal::new("a1", Role::Admin);

    let mut feed = messages
        .subscribe(&instructor, &c1)
        .await
        .expect("instructor may subscribe");
    messages
        .post(&sender(), &c1, "running late")
        .await
        .expect("enrolled patient may post");
    messages
        .post(&admin, &c1, "noted")
        .await
        .expect("admin may post anywhere");

    let first = feed.next().await.expect("feed should yield");
    assert_eq!(first.content, "running late");

    let history = messages
        .history(&instructor, &c1)
        .await
        .expect("instructor may read");
    assert_eq!(history.len(), 2);

    let rooms = |principal: Principal| {
        let messages = messages.clone();
        async move {
            messages
                .rooms(&principal)
                .await
                .expect("rooms should load")
                .into_iter()
                .map(|course| course.id.into_inner())
                .collect::<Vec<_>>()
        }
    };
    assert_eq!(rooms(sender()).await, ["c1"]);
    assert_eq!(rooms(instructor).await, ["c1"]);
    assert_eq!(rooms(admin).await, ["c1", "c2"]);
    assert!(rooms(Principal::new("p9", Role::Patient)).await.is_empty());
}
