use std::collections::HashMap;
use std::sync::Arc;

use neoquent::connection::driver::{Node, Path, Relationship};
use neoquent::connection::{ExecutionError, GraphValue, Row};
use neoquent::cypher_generator::{Capabilities, CompilationError};
use neoquent::query::{Aggregate, Model, NodeRef, PathQuery, PathTarget, QueryBuilder};
use serde::Deserialize;
use serde_json::{json, Value};

use super::support::{connection, syntax_error, user_row, RecordingDriver};

#[derive(Debug, Deserialize, PartialEq)]
struct User {
    id: i64,
    name: String,
}

impl Model for User {
    fn label() -> &'static str {
        "User"
    }

    fn key(&self) -> Option<Value> {
        Some(json!(self.id))
    }
}

#[tokio::test]
async fn test_get_sends_compiled_query_and_hydrates_nodes() {
    let driver = RecordingDriver::new();
    driver.respond(Ok(vec![user_row(1, "Ada"), user_row(2, "Grace")]));
    let conn = connection(Arc::new(driver.clone()));

    let users = conn
        .query("User")
        .where_op("age", ">", 25)
        .where_nested(|q| q.where_eq("status", "active").or_where_eq("status", "pending"))
        .get(&conn)
        .await
        .unwrap();

    assert_eq!(users.len(), 2);
    assert_eq!(users[1]["name"], json!("Grace"));

    let statements = driver.statements();
    assert_eq!(statements.len(), 1);
    assert_eq!(
        statements[0].0,
        "MATCH (n:User) WHERE n.age > $age_0 AND (n.status = $status_0 OR n.status = $status_1) RETURN n"
    );
    assert_eq!(statements[0].1.get("age_0"), Some(&json!(25)));
    assert_eq!(statements[0].1.get("status_1"), Some(&json!("pending")));
}

#[tokio::test]
async fn test_first_limits_to_one_row() {
    let driver = RecordingDriver::new();
    driver.respond(Ok(vec![user_row(7, "Linus")]));
    let conn = connection(Arc::new(driver.clone()));

    let user = conn
        .query("User")
        .where_eq("id", 7)
        .first(&conn)
        .await
        .unwrap();

    assert_eq!(user.and_then(|u| u.get("id").cloned()), Some(json!(7)));
    assert_eq!(
        driver.cypher(),
        vec!["MATCH (n:User) WHERE n.id = $id_0 RETURN n LIMIT 1"]
    );
}

#[tokio::test]
async fn test_first_on_empty_result_is_none() {
    let driver = RecordingDriver::new();
    let conn = connection(Arc::new(driver.clone()));

    let user = conn.first(&conn.query("User")).await.unwrap();
    assert!(user.is_none());
    assert_eq!(driver.cypher(), vec!["MATCH (n:User) RETURN n LIMIT 1"]);
}

#[tokio::test]
async fn test_count_reads_count_column() {
    let driver = RecordingDriver::new();
    driver.respond(Ok(vec![Row::from_pairs([("count", 42i64)])]));
    let conn = connection(Arc::new(driver.clone()));

    let count = conn
        .query("User")
        .where_not_null("email")
        .limit(10)
        .count(&conn)
        .await
        .unwrap();

    assert_eq!(count, 42);
    assert_eq!(
        driver.cypher(),
        vec!["MATCH (n:User) WHERE n.email IS NOT NULL RETURN count(*) AS count"]
    );
}

#[tokio::test]
async fn test_count_without_rows_is_unexpected() {
    let driver = RecordingDriver::new();
    let conn = connection(Arc::new(driver.clone()));

    let err = conn.query("User").count(&conn).await.unwrap_err();
    assert!(matches!(err, ExecutionError::UnexpectedResult(_)));
}

#[tokio::test]
async fn test_aggregate_returns_plain_value() {
    let driver = RecordingDriver::new();
    driver.respond(Ok(vec![Row::from_pairs([(
        "aggregate",
        GraphValue::Float(12.5),
    )])]));
    let conn = connection(Arc::new(driver.clone()));

    let avg = conn
        .query("Order")
        .aggregate(&conn, Aggregate::Avg, "total")
        .await
        .unwrap();

    assert_eq!(avg, json!(12.5));
    assert_eq!(
        driver.cypher(),
        vec!["MATCH (n:Order) RETURN avg(n.total) AS aggregate"]
    );
}

#[tokio::test]
async fn test_with_model_hydrates_entities() {
    let driver = RecordingDriver::new();
    driver.respond(Ok(vec![user_row(1, "Ada")]));
    let conn = connection(Arc::new(driver.clone()));

    let users: Vec<User> = QueryBuilder::for_model::<User>()
        .where_eq("name", "Ada")
        .with_model::<User>()
        .get(&conn)
        .await
        .unwrap();

    assert_eq!(
        users,
        vec![User {
            id: 1,
            name: "Ada".to_string()
        }]
    );
}

#[tokio::test]
async fn test_hydration_failure_names_the_row() {
    let driver = RecordingDriver::new();
    driver.respond(Ok(vec![
        user_row(1, "Ada"),
        Row::from_pairs([("name", "missing id")]),
    ]));
    let conn = connection(Arc::new(driver.clone()));

    let err = QueryBuilder::for_model::<User>()
        .with_model::<User>()
        .get(&conn)
        .await
        .unwrap_err();
    assert!(matches!(err, ExecutionError::Hydration { row: 1, .. }));
}

#[tokio::test]
async fn test_compilation_error_sends_nothing() {
    let driver = RecordingDriver::new();
    let conn = connection(Arc::new(driver.clone()));

    let err = conn
        .query("User")
        .where_op("age", "; DROP", 1)
        .get(&conn)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::Compilation(CompilationError::UnsupportedOperator { .. })
    ));
    assert!(driver.statements().is_empty());
}

#[tokio::test]
async fn test_connection_capabilities_reach_the_compiler() {
    let driver = RecordingDriver::new();
    let conn = connection(Arc::new(driver.clone())).with_capabilities(Capabilities::with_apoc());

    conn.query("User")
        .where_json_contains("settings->theme", "dark")
        .get(&conn)
        .await
        .unwrap();

    assert!(driver.cypher()[0].contains("apoc.convert.fromJsonMap"));
}

#[tokio::test]
async fn test_permanent_failure_carries_diagnostics() {
    let driver = RecordingDriver::new();
    driver.respond(Err(syntax_error()));
    let conn = connection(Arc::new(driver.clone()));

    let err = conn
        .query("User")
        .where_eq("name", "Ada")
        .get(&conn)
        .await
        .unwrap_err();

    let diagnostics = err.diagnostics().unwrap();
    assert_eq!(
        diagnostics.cypher,
        "MATCH (n:User) WHERE n.name = $name_0 RETURN n"
    );
    assert_eq!(diagnostics.parameters.get("name_0"), Some(&json!("Ada")));
    assert!(err.to_string().contains("Neo.ClientError.Statement.SyntaxError"));
}

#[tokio::test]
async fn test_shortest_path_result_normalizes_to_nodes_and_relationships() {
    let node = |id: i64, name: &str| {
        Node::new(
            id,
            vec!["User".to_string()],
            HashMap::from([("name".to_string(), GraphValue::from(name))]),
            format!("4:test:{}", id),
        )
    };
    let path = Path {
        nodes: vec![node(1, "Ada"), node(2, "Grace")],
        relationships: vec![Relationship {
            id: 10,
            start_node_id: 1,
            end_node_id: 2,
            rel_type: "KNOWS".to_string(),
            properties: HashMap::from([("since".to_string(), GraphValue::Integer(2020))]),
            element_id: "5:test:10".to_string(),
            start_node_element_id: "4:test:1".to_string(),
            end_node_element_id: "4:test:2".to_string(),
        }],
    };

    let driver = RecordingDriver::new();
    driver.respond(Ok(vec![Row::new(
        vec!["path".to_string()],
        vec![GraphValue::Path(path)],
    )]));
    let conn = connection(Arc::new(driver.clone()));

    let query = PathQuery::new(Some(NodeRef::new("User", 1))).shortest_path(
        PathTarget::Id(json!(2)),
        Some("KNOWS"),
        None,
    );
    let rows = conn.select(&query).await.unwrap();
    let properties = neoquent::query::row_properties(&rows[0]);

    assert_eq!(
        properties["path"],
        json!({
            "nodes": [{"name": "Ada"}, {"name": "Grace"}],
            "relationships": [{"since": 2020}]
        })
    );
    assert_eq!(driver.statements()[0].1.get("target_id"), Some(&json!(2)));
}
