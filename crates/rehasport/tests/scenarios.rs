use futures::StreamExt;
use rehasport::{
    Runtime,
    config::Config,
    core::{
        catalog::NewCourse,
        db::store::MemoryStore,
        enrollment::EnrollmentError,
        identity::{SessionClaims, StaticSessionResolver},
        obs::MetricsRegistry,
        profile::{NewPatient, OwnProfilePatch},
    },
    prelude::*,
};
use std::{sync::Arc, time::Duration};

struct Harness {
    runtime: Runtime,
    sessions: Arc<StaticSessionResolver>,
    metrics: Arc<MetricsRegistry>,
}

impl Harness {
    fn new(config: Config) -> Self {
        let sessions = Arc::new(StaticSessionResolver::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let runtime = Runtime::with_sink(
            config,
            Arc::new(MemoryStore::new()),
            sessions.clone(),
            metrics.clone(),
        )
        .expect("default config should be valid");

        Self {
            runtime,
            sessions,
            metrics,
        }
    }

    /// Issue a token for `subject` and sign them in through the gate.
    async fn login(&self, subject: &str, role: &str) -> (String, Principal) {
        let token = format!("token-{subject}");
        self.sessions.issue(
            token.clone(),
            SessionClaims::new(subject, Timestamp::from_seconds(4_102_444_800))
                .with_email(format!("{subject}@example.org"))
                .with_metadata_role(role),
        );

        let routed = self.runtime.identity().route(Some(&token), "/profile").await;
        let principal = routed
            .viewer
            .principal()
            .cloned()
            .expect("login should yield a principal");

        (token, principal)
    }

    async fn course(&self, admin: &Principal, capacity: u32) -> Course {
        self.runtime
            .catalog()
            .create_course(
                admin,
                NewCourse {
                    title: "Spine mobility".to_string(),
                    description: None,
                    capacity,
                    instructor_id: None,
                    start: Timestamp::from_seconds(1_800_000_000),
                    end: Timestamp::from_seconds(1_800_003_600),
                    location: Some("Hall B".to_string()),
                },
            )
            .await
            .expect("admin should create a course")
    }
}

#[tokio::test]
async fn routing_follows_roles() {
    let h = Harness::new(Config::default());
    let (admin_token, admin) = h.login("admin-1", "admin").await;
    let (patient_token, patient) = h.login("patient-1", "patient").await;
    let identity = h.runtime.identity();

    assert_eq!(admin.role, Role::Admin);
    assert_eq!(patient.role, Role::Patient);

    let routed = identity.route(Some(&admin_token), "/admin").await;
    assert_eq!(routed.decision, Decision::Allow);

    let routed = identity.route(Some(&patient_token), "/admin").await;
    assert_eq!(routed.decision, Decision::RedirectTo(Area::PatientDashboard));

    let routed = identity.route(None, "/courses").await;
    assert_eq!(routed.viewer, Viewer::Anonymous);
    assert_eq!(routed.decision, Decision::RedirectTo(Area::Login));

    let routed = identity.route(None, "/auth").await;
    assert_eq!(routed.decision, Decision::Allow);

    let counters = h.metrics.report(None).counters.expect("counters");
    assert_eq!(counters.profiles_created, 2);
    assert_eq!(counters.access_redirected, 2);
}

#[tokio::test]
async fn last_seat_goes_to_one_patient() {
    let h = Harness::new(Config::default());
    let (_, admin) = h.login("admin-1", "admin").await;
    let (_, first) = h.login("patient-1", "patient").await;
    let (_, second) = h.login("patient-2", "patient").await;
    let course = h.course(&admin, 1).await;
    let enrollment = h.runtime.enrollment();

    enrollment
        .enroll_as(&first, &course.id, &first.id)
        .await
        .expect("first patient should get the seat");
    let err = enrollment
        .enroll_as(&second, &course.id, &second.id)
        .await
        .expect_err("course is full");
    assert!(matches!(err, EnrollmentError::CapacityExceeded { capacity: 1, .. }));
    assert_eq!(err.kind(), ErrorKind::Capacity);

    let capacity = enrollment.capacity_of(&course.id).await.expect("capacity");
    assert_eq!((capacity.current, capacity.remaining), (1, 0));

    let err = enrollment
        .remove_as(&second, &course.id, &first.id)
        .await
        .expect_err("patients may not remove each other");
    assert_eq!(err.kind(), ErrorKind::Authorization);

    enrollment
        .remove_as(&first, &course.id, &first.id)
        .await
        .expect("patient may leave");
    enrollment
        .enroll_as(&second, &course.id, &second.id)
        .await
        .expect("freed seat should be available");

    let participants = enrollment.participants(&course.id).await.expect("participants");
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0].patient_id, second.id);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_patients_never_overbook() {
    let h = Harness::new(Config::default());
    let (_, admin) = h.login("admin-1", "admin").await;
    let course = h.course(&admin, 3).await;

    let mut patients = Vec::new();
    for n in 0..12 {
        let (_, patient) = h.login(&format!("patient-{n}"), "patient").await;
        patients.push(patient);
    }

    let tasks: Vec<_> = patients
        .into_iter()
        .map(|patient| {
            let enrollment = h.runtime.enrollment().clone();
            let course_id = course.id.clone();
            tokio::spawn(async move { enrollment.enroll(&course_id, &patient.id).await })
        })
        .collect();

    let mut admitted = 0;
    for task in tasks {
        match task.await.expect("task should not panic") {
            Ok(_) => admitted += 1,
            Err(EnrollmentError::CapacityExceeded { .. }) => {}
            Err(err) => panic!("unexpected enrollment error: {err}"),
        }
    }

    assert_eq!(admitted, 3);
    let stored = h.runtime.catalog().get_course(&course.id).await.expect("course");
    assert_eq!(stored.current_enrollment, 3);

    let counters = h.metrics.report(None).counters.expect("counters");
    assert_eq!(counters.enroll_committed, 3);
    assert_eq!(counters.enroll_rejected.get("capacity_exceeded"), Some(&9));
}

#[tokio::test]
async fn course_chat_reaches_subscribers_once() {
    let h = Harness::new(Config::default());
    let (_, admin) = h.login("admin-1", "admin").await;
    let (_, patient) = h.login("patient-1", "patient").await;
    let course = h.course(&admin, 4).await;
    let other = h.course(&admin, 4).await;
    let messages = h.runtime.messages();

    let err = messages
        .post(&patient, &course.id, "hello")
        .await
        .expect_err("chat is limited to participants");
    assert_eq!(err.kind(), ErrorKind::Authorization);

    h.runtime
        .enrollment()
        .enroll_as(&patient, &course.id, &patient.id)
        .await
        .expect("patient should enroll");
    let mut stream = messages
        .subscribe(&patient, &course.id)
        .await
        .expect("participant may subscribe");

    messages
        .post(&admin, &other.id, "elsewhere")
        .await
        .expect("post to other course");
    let posted = messages
        .post(&patient, &course.id, "  see you at nine  ")
        .await
        .expect("post should succeed");
    assert_eq!(posted.content, "see you at nine");

    // replaying the same message must not reach the subscriber twice
    h.runtime.channel().publish(&posted);

    let received = tokio::time::timeout(Duration::from_secs(1), stream.next())
        .await
        .expect("message should arrive")
        .expect("stream should stay open");
    assert_eq!(received.id, posted.id);

    let nothing = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
    assert!(nothing.is_err(), "duplicate should be dropped");

    let history = messages.history(&admin, &course.id).await.expect("history");
    assert_eq!(history, vec![posted]);

    let rooms = messages.rooms(&patient).await.expect("rooms");
    let ids: Vec<_> = rooms.into_iter().map(|room| room.id).collect();
    assert_eq!(ids, vec![course.id]);
}

#[tokio::test]
async fn registered_patient_signs_in_and_edits_profile() {
    let h = Harness::new(Config::default());
    let (_, admin) = h.login("admin-1", "admin").await;
    let profiles = h.runtime.profiles();

    profiles
        .create_patient(
            &admin,
            NewPatient {
                id: PrincipalId::new("patient-7"),
                email: Some("patient-7@example.org".to_string()),
                full_name: "Jonas Richter".to_string(),
                phone: None,
                insurance_provider: Some("DAK".to_string()),
                insurance_number: None,
                notes: None,
            },
        )
        .await
        .expect("admin should register the patient");

    let (_, patient) = h.login("patient-7", "patient").await;
    assert_eq!(patient.role, Role::Patient);

    let edited = profiles
        .update_own(
            &patient,
            OwnProfilePatch {
                phone: Some("0151 000000".to_string()),
                ..OwnProfilePatch::default()
            },
        )
        .await
        .expect("patient should edit their profile");
    assert_eq!(edited.full_name.as_deref(), Some("Jonas Richter"));
    assert_eq!(edited.insurance_provider.as_deref(), Some("DAK"));

    let err = profiles
        .list_patients(&patient, None)
        .await
        .expect_err("directory is staff only");
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let listed = profiles.list_patients(&admin, Some("richter")).await.expect("list");
    assert_eq!(listed, vec![edited]);
}

#[test]
fn invalid_config_is_rejected_at_startup() {
    let config = Config::from_toml_str("[enrollment]\nmax_retries = 3\n").expect("valid toml");
    assert_eq!(config.enrollment.max_retries, 3);

    let mut config = Config::default();
    config.feed.channel_capacity = 0;

    let result = Runtime::in_memory(config, Arc::new(StaticSessionResolver::new()));
    assert!(result.is_err());
}

#[test]
fn version_is_exposed() {
    assert!(!rehasport::VERSION.is_empty());
}
