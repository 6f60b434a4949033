use super::*;
use crate::test_helpers;
use crate::test_helpers::TestHelper;
use elefant_test_macros::pg_test;

async fn read_catalog(helper: &TestHelper) -> Catalog {
    CatalogReader::new(helper.get_conn(), &BranchOptions::default())
        .read_catalog()
        .await
        .unwrap()
}

#[pg_test(arg(postgres = 16))]
async fn branch_commit_and_delete_leave_tables_untouched(helper: &TestHelper) {
    helper
        .execute_not_query(
            r#"
    create table users(accountid int generated always as identity primary key, username varchar(12) not null unique);
    create table logs(message text);
    create rule logs_no_delete as on delete to logs do instead nothing;
    insert into users(username) values ('A'), ('B');
    "#,
        )
        .await;

    let before = read_catalog(helper).await;

    let mut brancher = Brancher::new(helper.get_conn(), BranchOptions::default()).await.unwrap();
    let branch = brancher.branch("control").await.unwrap();
    assert_eq!(branch.state, BranchState::Active);
    assert_eq!(branch.tables.keys().collect::<Vec<_>>(), vec!["logs", "users"]);
    assert!(branch.tables.values().all(|t| t.phase == ClonePhase::TriggersInstalled));
    assert_eq!(brancher.active_branch(), Some("control"));

    helper.execute_not_query("insert into users(username) values ('C'); insert into logs values ('hello');").await;

    brancher.commit("control").await.unwrap();
    assert_eq!(brancher.get_branch("control").unwrap().state, BranchState::Committed);
    assert_eq!(brancher.active_branch(), None);

    let users: Vec<String> = helper.get_single_results("select username::text from users order by accountid").await;
    assert_eq!(users, vec!["A".to_string(), "B".to_string()]);

    let kept: i64 = helper.get_single_result("select count(*) from control.usersplus").await;
    assert_eq!(kept, 1);

    let deleted = brancher.delete("control").await.unwrap();
    assert_eq!(deleted.state, BranchState::Deleted);
    assert!(brancher.get_branch("control").is_none());

    let after = read_catalog(helper).await;
    similar_asserts::assert_eq!(before, after);
}

#[pg_test(arg(postgres = 16))]
async fn only_one_branch_is_active_at_a_time(helper: &TestHelper) {
    helper.execute_not_query("create table users(accountid int primary key, username text);").await;

    let mut brancher = Brancher::new(helper.get_conn(), BranchOptions::default()).await.unwrap();
    brancher.branch("control").await.unwrap();

    let second = brancher.branch("experimental").await;
    assert!(matches!(second, Err(ElefantBranchError::BranchAlreadyActive(ref active)) if active == "control"));

    brancher.commit("control").await.unwrap();

    let again = brancher.branch("control").await;
    assert!(matches!(again, Err(ElefantBranchError::BranchAlreadyExists(_))));

    brancher.branch("experimental").await.unwrap();
    brancher.commit("experimental").await.unwrap();

    let recommit = brancher.commit("experimental").await;
    assert!(matches!(recommit, Err(ElefantBranchError::BranchNotActive(_))));

    let unknown = brancher.commit("nope").await;
    assert!(matches!(unknown, Err(ElefantBranchError::UnknownBranch(_))));
}

#[pg_test(arg(postgres = 16))]
async fn existing_schemas_are_not_reused(helper: &TestHelper) {
    helper.execute_not_query("create table users(accountid int primary key); create schema taken;").await;

    let mut brancher = Brancher::new(helper.get_conn(), BranchOptions::default()).await.unwrap();
    let result = brancher.branch("taken").await;

    assert!(matches!(result, Err(ElefantBranchError::BranchAlreadyExists(_))));
    assert_eq!(brancher.active_branch(), None);
}

#[pg_test(arg(postgres = 16))]
async fn tables_clashing_with_branch_relations_are_refused(helper: &TestHelper) {
    helper.execute_not_query("create table users(accountid int primary key); create table usersplus(id int);").await;
    let before = read_catalog(helper).await;

    let mut brancher = Brancher::new(helper.get_conn(), BranchOptions::default()).await.unwrap();
    let result = brancher.branch("control").await;

    match result {
        Err(ElefantBranchError::BranchNameConflict { table, relation }) => {
            assert_eq!(table, "users");
            assert_eq!(relation, "usersplus");
        }
        other => panic!("Expected a name conflict, got {:?}", other.map(|b| b.namespace.clone())),
    }
    assert_eq!(brancher.active_branch(), None);
    assert!(brancher.get_branch("control").is_none());

    let schemas: i64 = helper.get_single_result("select count(*) from pg_namespace where nspname = 'control'").await;
    assert_eq!(schemas, 0);
    similar_asserts::assert_eq!(before, read_catalog(helper).await);
}

#[pg_test(arg(postgres = 16))]
async fn deleting_an_active_branch_resets_it(helper: &TestHelper) {
    helper
        .execute_not_query(
            r#"
    create table users(accountid int primary key, username text);
    insert into users values (1, 'A');
    "#,
        )
        .await;

    let mut brancher = Brancher::new(helper.get_conn(), BranchOptions::default()).await.unwrap();
    brancher.branch("control").await.unwrap();
    helper.execute_not_query("delete from users;").await;

    brancher.delete("control").await.unwrap();
    assert_eq!(brancher.active_branch(), None);

    let users = helper.get_results::<(i32, Option<String>)>("select accountid, username from users").await;
    assert_eq!(users, vec![(1, Some("A".to_string()))]);

    let schemas: i64 = helper.get_single_result("select count(*) from pg_namespace where nspname = 'control'").await;
    assert_eq!(schemas, 0);
}

#[pg_test(arg(postgres = 16))]
async fn request_ids_count_per_branch(helper: &TestHelper) {
    helper.execute_not_query("create table users(accountid int primary key);").await;

    let mut brancher = Brancher::new(helper.get_conn(), BranchOptions::default()).await.unwrap();
    brancher.branch("control").await.unwrap();

    assert_eq!(brancher.current_request_id("control").await.unwrap(), 0);
    assert_eq!(brancher.increment_request_id("control").await.unwrap(), 1);
    assert_eq!(brancher.increment_request_id("control").await.unwrap(), 2);
    assert_eq!(brancher.current_request_id("control").await.unwrap(), 2);

    assert!(matches!(
        brancher.increment_request_id("experimental").await,
        Err(ElefantBranchError::UnknownBranch(_))
    ));
}

#[pg_test(arg(postgres = 16))]
async fn partially_created_branches_can_be_deleted(helper: &TestHelper) {
    helper
        .execute_not_query(
            r#"
    create table requests(id int primary key, rid bigint);
    create table users(accountid int primary key, username text);
    insert into users values (1, 'A');
    "#,
        )
        .await;

    let before = read_catalog(helper).await;

    let mut brancher = Brancher::new(helper.get_conn(), BranchOptions::default()).await.unwrap();
    let result = brancher.branch("control").await;

    match result {
        Err(ElefantBranchError::BranchCreationFailed { namespace, source }) => {
            assert_eq!(namespace, "control");
            assert!(matches!(*source, ElefantBranchError::CounterColumnConflict { ref table, .. } if table == "requests"));
        }
        other => panic!("Expected the branch to fail, got {:?}", other.map(|b| b.namespace.clone())),
    }
    assert_eq!(brancher.active_branch(), Some("control"));

    brancher.delete("control").await.unwrap();

    let after = read_catalog(helper).await;
    similar_asserts::assert_eq!(before, after);
}

#[pg_test(arg(postgres = 16))]
async fn new_brancher_cleans_up_after_a_crash(helper: &TestHelper) {
    helper
        .execute_not_query(
            r#"
    create table users(accountid int primary key, username text);
    insert into users values (1, 'A');
    "#,
        )
        .await;

    {
        let mut crashed = Brancher::new(helper.get_conn(), BranchOptions::default()).await.unwrap();
        crashed.branch("control").await.unwrap();
        helper.execute_not_query("insert into users values (2, 'B');").await;
    }

    let brancher = Brancher::new(helper.get_conn(), BranchOptions::default()).await.unwrap();
    assert_eq!(brancher.active_branch(), None);

    let users = helper.get_results::<(i32, Option<String>)>("select accountid, username from users").await;
    assert_eq!(users, vec![(1, Some("A".to_string()))]);

    let kind: String = helper
        .get_single_result("select relkind::text from pg_class where oid = 'public.users'::regclass")
        .await;
    assert_eq!(kind, "r");
}

#[pg_test(arg(postgres = 16))]
async fn branches_with_different_tables_cannot_be_compared(helper: &TestHelper) {
    helper.execute_not_query("create table users(accountid int primary key);").await;

    let mut brancher = Brancher::new(helper.get_conn(), BranchOptions::default()).await.unwrap();
    brancher.branch("control").await.unwrap();
    brancher.commit("control").await.unwrap();

    helper.execute_not_query("create table logs(message text);").await;
    brancher.branch("experimental").await.unwrap();
    brancher.commit("experimental").await.unwrap();

    let result = brancher.compute_diff_at_n("control", "experimental", 0, &BTreeMap::new()).await;
    match result {
        Err(ElefantBranchError::TableSetMismatch { left, right }) => {
            assert_eq!(left, vec!["users".to_string()]);
            assert_eq!(right, vec!["logs".to_string(), "users".to_string()]);
        }
        other => panic!("Expected a table mismatch, got {:?}", other),
    }
}
