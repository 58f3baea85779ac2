use crate::{
    db::Db,
    error::ErrorKind,
    identity::Area,
    model::{Principal, Profile, Role},
    profile::{NewPatient, OwnProfilePatch, PatientPatch, ProfileError, ProfileService},
    test_support::{ConflictingStore, memory_db, seed_profile},
    types::PrincipalId,
};
use rehasport_config::EnrollmentConfig;
use std::sync::Arc;

fn service(db: Db) -> ProfileService {
    ProfileService::new(db, &EnrollmentConfig::default())
}

fn admin() -> Principal {
    Principal::new("a1", Role::Admin)
}

fn new_patient(id: &str, name: &str, insurer: &str) -> NewPatient {
    NewPatient {
        id: PrincipalId::new(id),
        email: Some(format!("{id}@example.test")),
        full_name: name.to_string(),
        phone: Some("  ".to_string()),
        insurance_provider: Some(insurer.to_string()),
        insurance_number: Some("A123456789".to_string()),
        notes: None,
    }
}

async fn stored(db: &Db, id: &str) -> Profile {
    db.load::<Profile>(id)
        .await
        .expect("profile load should succeed")
        .expect("profile should exist")
        .entity
}

#[tokio::test]
async fn principals_edit_their_own_name_and_phone() {
    let (_, db) = memory_db();
    seed_profile(&db, "p1", Role::Patient).await;
    let profiles = service(db.clone());
    let patient = Principal::new("p1", Role::Patient);

    let updated = profiles
        .update_own(
            &patient,
            OwnProfilePatch {
                full_name: Some("  Anna Becker ".to_string()),
                phone: Some("+49 89 1234".to_string()),
            },
        )
        .await
        .expect("own profile should update");
    assert_eq!(updated.full_name.as_deref(), Some("Anna Becker"));
    assert_eq!(updated.phone.as_deref(), Some("+49 89 1234"));
    assert!(updated.updated_at.is_some());

    let cleared = profiles
        .update_own(
            &patient,
            OwnProfilePatch {
                phone: Some(String::new()),
                ..OwnProfilePatch::default()
            },
        )
        .await
        .expect("blank phone should clear");
    assert_eq!(cleared.phone, None);
    assert_eq!(cleared.full_name.as_deref(), Some("Anna Becker"));

    let persisted = stored(&db, "p1").await;
    assert_eq!(persisted, cleared);
    assert_eq!(persisted.role, Role::Patient);

    let own = profiles.own(&patient).await.expect("own profile");
    assert_eq!(own.id, patient.id);
}

#[tokio::test]
async fn own_edits_are_validated_and_need_a_profile() {
    let (_, db) = memory_db();
    seed_profile(&db, "t1", Role::Trainer).await;
    let profiles = service(db);

    let err = profiles
        .update_own(
            &Principal::new("t1", Role::Trainer),
            OwnProfilePatch {
                full_name: Some("   ".to_string()),
                ..OwnProfilePatch::default()
            },
        )
        .await
        .expect_err("blank name");
    let ProfileError::Invalid(issues) = err else {
        panic!("expected validation error, got {err}");
    };
    assert_eq!(issues.issues_for("full_name"), ["must not be empty"]);

    let err = profiles
        .update_own(&Principal::new("ghost", Role::Patient), OwnProfilePatch::default())
        .await
        .expect_err("no profile row");
    assert!(matches!(err, ProfileError::NotFound { .. }));
}

#[tokio::test]
async fn own_edits_retry_through_concurrent_changes() {
    let (memory, _) = memory_db();
    let conflicting = Arc::new(ConflictingStore::new(memory, 2));
    let db = Db::new(conflicting.clone());
    seed_profile(&db, "p1", Role::Patient).await;
    let profiles = service(db);

    let updated = profiles
        .update_own(
            &Principal::new("p1", Role::Patient),
            OwnProfilePatch {
                full_name: Some("Anna".to_string()),
                ..OwnProfilePatch::default()
            },
        )
        .await
        .expect("third attempt should succeed");

    assert_eq!(updated.full_name.as_deref(), Some("Anna"));
    assert_eq!(conflicting.commits(), 3);
}

#[tokio::test]
async fn staff_create_patients() {
    let (_, db) = memory_db();
    let profiles = service(db.clone());

    let created = profiles
        .create_patient(
            &Principal::new("t1", Role::Trainer),
            new_patient("p1", " Anna Becker ", "AOK"),
        )
        .await
        .expect("trainer may register patients");
    assert_eq!(created.role, Role::Patient);
    assert_eq!(created.full_name.as_deref(), Some("Anna Becker"));
    assert_eq!(created.phone, None);
    assert_eq!(stored(&db, "p1").await, created);

    let err = profiles
        .create_patient(&admin(), new_patient("p1", "Someone Else", "TK"))
        .await
        .expect_err("duplicate id");
    assert!(matches!(err, ProfileError::AlreadyExists { .. }));

    let err = profiles
        .create_patient(&Principal::new("p2", Role::Patient), new_patient("p3", "Eve", "TK"))
        .await
        .expect_err("patients may not register patients");
    assert!(matches!(
        err,
        ProfileError::Forbidden {
            area: Area::Patients,
            ..
        }
    ));
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let err = profiles
        .create_patient(&admin(), new_patient("p4", "", "TK"))
        .await
        .expect_err("blank name");
    assert_eq!(err.kind(), ErrorKind::Validation);
}

#[tokio::test]
async fn staff_update_only_patient_records() {
    let (_, db) = memory_db();
    seed_profile(&db, "t2", Role::Trainer).await;
    let profiles = service(db.clone());
    profiles
        .create_patient(&admin(), new_patient("p1", "Anna Becker", "AOK"))
        .await
        .expect("create");

    let updated = profiles
        .update_patient(
            &admin(),
            &PrincipalId::new("p1"),
            PatientPatch {
                insurance_provider: Some("Techniker".to_string()),
                notes: Some("Knee surgery 2024".to_string()),
                insurance_number: Some(" ".to_string()),
                ..PatientPatch::default()
            },
        )
        .await
        .expect("update should succeed");
    assert_eq!(updated.insurance_provider.as_deref(), Some("Techniker"));
    assert_eq!(updated.notes.as_deref(), Some("Knee surgery 2024"));
    assert_eq!(updated.insurance_number, None);
    assert_eq!(updated.full_name.as_deref(), Some("Anna Becker"));
    assert_eq!(stored(&db, "p1").await, updated);

    let err = profiles
        .update_patient(&admin(), &PrincipalId::new("t2"), PatientPatch::default())
        .await
        .expect_err("trainers are not patients");
    assert!(matches!(err, ProfileError::NotAPatient { role: Role::Trainer, .. }));

    let err = profiles
        .update_patient(
            &Principal::new("p1", Role::Patient),
            &PrincipalId::new("p1"),
            PatientPatch::default(),
        )
        .await
        .expect_err("patients use update_own");
    assert_eq!(err.kind(), ErrorKind::Authorization);

    let fetched = profiles
        .get_patient(&Principal::new("t1", Role::Trainer), &PrincipalId::new("p1"))
        .await
        .expect("staff may read patients");
    assert_eq!(fetched, updated);
}

#[tokio::test]
async fn patient_directory_is_sorted_and_searchable() {
    let (_, db) = memory_db();
    seed_profile(&db, "t1", Role::Trainer).await;
    let profiles = service(db);
    for (id, name, insurer) in [
        ("p1", "Clara Weber", "TK"),
        ("p2", "Anna Becker", "AOK Bayern"),
        ("p3", "Bernd Schulz", "Barmer"),
    ] {
        profiles
            .create_patient(&admin(), new_patient(id, name, insurer))
            .await
            .expect("create");
    }

    let names = |listed: Vec<Profile>| -> Vec<String> {
        listed.into_iter().filter_map(|p| p.full_name).collect()
    };

    let all = profiles
        .list_patients(&admin(), None)
        .await
        .expect("list");
    assert_eq!(names(all), ["Anna Becker", "Bernd Schulz", "Clara Weber"]);

    let by_insurer = profiles
        .list_patients(&admin(), Some("aok"))
        .await
        .expect("list");
    assert_eq!(names(by_insurer), ["Anna Becker"]);

    let by_email = profiles
        .list_patients(&admin(), Some("P3@EXAMPLE"))
        .await
        .expect("list");
    assert_eq!(names(by_email), ["Bernd Schulz"]);

    let blank = profiles
        .list_patients(&admin(), Some("  "))
        .await
        .expect("list");
    assert_eq!(blank.len(), 3);

    let err = profiles
        .list_patients(&Principal::new("p1", Role::Patient), None)
        .await
        .expect_err("patients may not browse the directory");
    assert_eq!(err.kind(), ErrorKind::Authorization);
}
