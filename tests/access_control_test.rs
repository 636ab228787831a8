//! 门禁配置集成测试：凭证 / 门组 / 时间组 / 判定

mod common;

use std::sync::Arc;

use chrono::{TimeZone, Utc};

use ownsa_server::http::HttpServerState;
use ownsa_server::model::credential::{
    CredentialPatch, CredentialStatus, CredentialType, DoorAccessUpdate, NewCredential,
};
use ownsa_server::model::device::{InterfaceBoardType, NewInterfaceBoard};
use ownsa_server::model::group::{
    NewAccessGroup, NewDoor, NewDoorGroup, NewSchedGroup, SchedWindow,
};
use ownsa_server::model::people::{NewDepartment, NewPeople};
use ownsa_server::model::Door;
use ownsa_server::infra::database::wipe_store_files;
use ownsa_server::service::{DenyReason, OsClock};
use ownsa_server::{build_state, ServerError, Stores};

use common::{temp_database_config, test_config, test_state, UNREACHABLE_BACKEND};

/// 一块接口板上的三扇门
async fn setup_doors(state: &HttpServerState) -> Vec<Door> {
    let board = state
        .devices
        .create_board(&NewInterfaceBoard {
            ib_type: InterfaceBoardType::Mt2,
            ib_addr: 1,
            name: "main".to_string(),
            enabled: None,
        })
        .await
        .unwrap();

    let mut doors = Vec::new();
    for output_addr in 1..=3 {
        doors.push(
            state
                .devices
                .create_door(&NewDoor {
                    interface_board_id: board.id,
                    output_addr,
                    name: format!("door-{}", output_addr),
                })
                .await
                .unwrap(),
        );
    }
    doors
}

async fn weekday_schedule(state: &HttpServerState) -> i64 {
    state
        .credentials
        .create_sched_group(&NewSchedGroup {
            name: "office".to_string(),
            windows: (0..5).map(|d| SchedWindow::new(d, 9 * 60, 18 * 60)).collect(),
        })
        .await
        .unwrap()
        .id
}

async fn card_credential(state: &HttpServerState, card_no: &str) -> i64 {
    let person = state
        .people
        .create(&NewPeople {
            first_name: "Li".to_string(),
            last_name: "Wei".to_string(),
            code: card_no.to_string(),
            ..Default::default()
        })
        .await
        .unwrap();
    state
        .credentials
        .create(&NewCredential::card(person.id, card_no))
        .await
        .unwrap()
        .unique_id
}

#[tokio::test]
async fn test_create_credential_defaults() {
    let state = test_state().await;
    let id = card_credential(&state, "C-100").await;

    let credential = state.credentials.find_by_id(id).await.unwrap();
    assert_eq!(credential.credential_type, CredentialType::Card);
    assert_eq!(credential.card_no.as_deref(), Some("C-100"));
    assert_eq!(credential.status, CredentialStatus::Active);
    assert_eq!(credential.valid_from, None);
    assert_eq!(credential.valid_until, None);
}

#[tokio::test]
async fn test_credential_requires_existing_people() {
    let state = test_state().await;
    let err = state
        .credentials
        .create(&NewCredential::card(999, "X"))
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Validation(_)));
}

#[tokio::test]
async fn test_update_door_access_then_list_doors() {
    let state = test_state().await;
    let doors = setup_doors(&state).await;
    let sched = weekday_schedule(&state).await;
    let cred = card_credential(&state, "C-1").await;

    assert!(state.credentials.list_doors(cred).await.unwrap().is_empty());

    let first = DoorAccessUpdate {
        door_ids: vec![doors[0].id, doors[1].id],
        sched_group_id: sched,
    };
    state.credentials.update_door_access(cred, &first).await.unwrap();

    // 第二次更新完整替换门集合
    let second = DoorAccessUpdate {
        door_ids: vec![doors[2].id, doors[1].id, doors[2].id],
        sched_group_id: sched,
    };
    state.credentials.update_door_access(cred, &second).await.unwrap();

    let mut listed: Vec<i64> = state
        .credentials
        .list_doors(cred)
        .await
        .unwrap()
        .into_iter()
        .map(|d| d.id)
        .collect();
    listed.sort_unstable();
    assert_eq!(listed, vec![doors[1].id, doors[2].id]);
}

#[tokio::test]
async fn test_update_door_access_rejects_unknown_door() {
    let state = test_state().await;
    let doors = setup_doors(&state).await;
    let sched = weekday_schedule(&state).await;
    let cred = card_credential(&state, "C-2").await;

    state
        .credentials
        .update_door_access(
            cred,
            &DoorAccessUpdate {
                door_ids: vec![doors[0].id],
                sched_group_id: sched,
            },
        )
        .await
        .unwrap();

    let err = state
        .credentials
        .update_door_access(
            cred,
            &DoorAccessUpdate {
                door_ids: vec![doors[1].id, 4242],
                sched_group_id: sched,
            },
        )
        .await
        .unwrap_err();
    assert!(matches!(err, ServerError::Validation(_)));

    // 失败的更新不改变原有门集合
    let listed = state.credentials.list_doors(cred).await.unwrap();
    assert_eq!(listed, vec![doors[0].clone()]);
}

#[tokio::test]
async fn test_deleted_credential_has_no_doors() {
    let state = test_state().await;
    let doors = setup_doors(&state).await;
    let sched = weekday_schedule(&state).await;
    let cred = card_credential(&state, "C-3").await;

    state
        .credentials
        .update_door_access(
            cred,
            &DoorAccessUpdate {
                door_ids: vec![doors[0].id],
                sched_group_id: sched,
            },
        )
        .await
        .unwrap();

    state.credentials.delete(cred).await.unwrap();

    assert!(matches!(
        state.credentials.list_doors(cred).await,
        Err(ServerError::NotFound(_))
    ));
    assert!(matches!(
        state.credentials.delete(cred).await,
        Err(ServerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_weekday_schedule_decision() {
    let state = test_state().await;
    let doors = setup_doors(&state).await;
    let sched = weekday_schedule(&state).await;
    let cred = card_credential(&state, "C-4").await;

    state
        .credentials
        .update_door_access(
            cred,
            &DoorAccessUpdate {
                door_ids: vec![doors[0].id],
                sched_group_id: sched,
            },
        )
        .await
        .unwrap();

    let tuesday = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
    let saturday = Utc.with_ymd_and_hms(2024, 1, 6, 10, 0, 0).unwrap();

    let granted = state
        .resolver
        .check_access(cred, doors[0].id, tuesday)
        .await
        .unwrap();
    assert!(granted.granted);

    let weekend = state
        .resolver
        .check_access(cred, doors[0].id, saturday)
        .await
        .unwrap();
    assert!(!weekend.granted);
    assert_eq!(weekend.reason, Some(DenyReason::OutsideSchedule));

    let other_door = state
        .resolver
        .check_access(cred, doors[1].id, tuesday)
        .await
        .unwrap();
    assert_eq!(other_door.reason, Some(DenyReason::DoorNotInGroup));

    // 按硬件地址判定得到同样的结论
    let by_address = state
        .resolver
        .check_access_at_address(cred, doors[0].ib_addr, doors[0].output_addr, tuesday)
        .await
        .unwrap();
    assert!(by_address.granted);
    assert_eq!(by_address.door_id, Some(doors[0].id));
}

#[tokio::test]
async fn test_empty_door_group_denies_every_door() {
    let state = test_state().await;
    let doors = setup_doors(&state).await;
    let sched = weekday_schedule(&state).await;
    let cred = card_credential(&state, "C-5").await;

    let door_group = state
        .credentials
        .create_door_group(&NewDoorGroup {
            name: "nothing".to_string(),
            door_ids: Vec::new(),
        })
        .await
        .unwrap();
    let access_group = state
        .credentials
        .create_access_group(&NewAccessGroup {
            name: "empty".to_string(),
            door_group_id: door_group.id,
            sched_group_id: sched,
        })
        .await
        .unwrap();
    state
        .credentials
        .assign_access_group(cred, access_group.id)
        .await
        .unwrap();

    let tuesday = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
    for door in &doors {
        let check = state.resolver.check_access(cred, door.id, tuesday).await.unwrap();
        assert!(!check.granted);
        assert_eq!(check.reason, Some(DenyReason::DoorNotInGroup));
    }
}

#[tokio::test]
async fn test_inactive_credential_is_denied() {
    let state = test_state().await;
    let doors = setup_doors(&state).await;
    let sched = weekday_schedule(&state).await;
    let cred = card_credential(&state, "C-6").await;

    state
        .credentials
        .update_door_access(
            cred,
            &DoorAccessUpdate {
                door_ids: vec![doors[0].id],
                sched_group_id: sched,
            },
        )
        .await
        .unwrap();
    state
        .credentials
        .update(
            cred,
            &CredentialPatch {
                status: Some(CredentialStatus::Inactive),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let tuesday = Utc.with_ymd_and_hms(2024, 1, 2, 10, 0, 0).unwrap();
    let check = state.resolver.check_access(cred, doors[0].id, tuesday).await.unwrap();
    assert_eq!(check.reason, Some(DenyReason::CredentialInactive));
}

#[tokio::test]
async fn test_department_delete_refused_while_referenced() {
    let state = test_state().await;
    let department = state
        .people
        .create_department(&NewDepartment {
            name: "R&D".to_string(),
        })
        .await
        .unwrap();
    let person = state
        .people
        .create(&NewPeople {
            first_name: "Zhang".to_string(),
            department_id: Some(department.id),
            ..Default::default()
        })
        .await
        .unwrap();

    assert!(matches!(
        state.people.delete_department(department.id).await,
        Err(ServerError::Validation(_))
    ));

    state.people.delete(person.id).await.unwrap();
    state.people.delete_department(department.id).await.unwrap();
    assert!(matches!(
        state.people.find_department(department.id).await,
        Err(ServerError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_people_delete_cascades_credentials() {
    let state = test_state().await;
    let cred = card_credential(&state, "C-7").await;
    let people_id = state.credentials.find_by_id(cred).await.unwrap().people_id;

    state.people.delete(people_id).await.unwrap();

    assert!(matches!(
        state.credentials.find_by_id(cred).await,
        Err(ServerError::NotFound(_))
    ));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_door_updates_are_atomic() {
    let db = temp_database_config();
    let stores = Arc::new(Stores::open(&db).await.unwrap());
    stores.migrate().await.unwrap();
    let mut config = test_config(UNREACHABLE_BACKEND);
    config.database = db.clone();
    let state = build_state(stores.clone(), &config, Arc::new(OsClock)).unwrap();

    let doors = setup_doors(&state).await;
    let sched = weekday_schedule(&state).await;
    let cred = card_credential(&state, "C-9").await;

    let set_a = vec![doors[0].id, doors[1].id];
    let set_b = vec![doors[2].id];
    state
        .credentials
        .update_door_access(
            cred,
            &DoorAccessUpdate {
                door_ids: set_a.clone(),
                sched_group_id: sched,
            },
        )
        .await
        .unwrap();

    let writer = {
        let state = state.clone();
        let (set_a, set_b) = (set_a.clone(), set_b.clone());
        tokio::spawn(async move {
            for round in 0..50 {
                let door_ids = if round % 2 == 0 { set_b.clone() } else { set_a.clone() };
                state
                    .credentials
                    .update_door_access(cred, &DoorAccessUpdate { door_ids, sched_group_id: sched })
                    .await
                    .unwrap();
            }
        })
    };

    let mut observations = 0;
    loop {
        let done = writer.is_finished();
        let mut listed: Vec<i64> = state
            .credentials
            .list_doors(cred)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.id)
            .collect();
        listed.sort_unstable();
        assert!(
            listed == set_a || listed == set_b,
            "torn door set observed: {:?}",
            listed
        );
        observations += 1;
        if done {
            break;
        }
    }
    writer.await.unwrap();
    assert!(observations > 0);

    drop(state);
    stores.close().await;
    wipe_store_files(&db).unwrap();
    let _ = std::fs::remove_dir_all(&db.data_dir);
}
