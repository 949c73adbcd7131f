//! Integration tests for named functions and the AND / OR / NOT algebra

use anyhow::Context;
use hrbac::{ExecutionMode, Hrbac, HrbacError, Parents, Predicate};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn request(role: &str, method: &str) -> Value {
    json!({
        "user": { "role": role },
        "route": { "path": "/admin/delete" },
        "method": method
    })
}

fn is_role(role: &'static str) -> Predicate<Value> {
    Predicate::immediate(move |req: &Value, _: &()| Ok(req["user"]["role"] == role))
}

fn is_method(method: &'static str) -> Predicate<Value> {
    Predicate::deferred(move |req: &Value, _: &()| {
        Box::pin(async move { Ok(req["method"] == method) })
    })
}

async fn holds(hrbac: &Hrbac<Value>, label: &str, req: &Value) -> bool {
    hrbac
        .middleware(label, None)
        .unwrap()
        .evaluate(req, &())
        .await
        .is_granted()
}

// ============================================================================
// DECLARATION ERRORS
// ============================================================================

#[test]
fn test_function_label_errors() {
    let hrbac: Hrbac<Value> = Hrbac::new();
    hrbac.add_role("admin", Parents::None).unwrap();
    hrbac.add_function("func", Predicate::constant(true)).unwrap();

    assert!(matches!(
        hrbac.add_function("", Predicate::constant(true)),
        Err(HrbacError::EmptyParameter(_))
    ));
    assert!(matches!(
        hrbac.add_function("func", Predicate::constant(false)),
        Err(HrbacError::LabelAlreadyInUse(_))
    ));
    assert!(matches!(
        hrbac.add_function("admin", Predicate::constant(false)),
        Err(HrbacError::LabelAlreadyInUse(_))
    ));
}

#[test]
fn test_operator_operand_errors() {
    let hrbac: Hrbac<Value> = Hrbac::new();
    hrbac.add_function("func", Predicate::constant(true)).unwrap();

    assert!(matches!(hrbac.or("nope", "func"), Err(HrbacError::MissingFunction(_))));
    assert!(matches!(hrbac.or("func", "nope"), Err(HrbacError::MissingFunction(_))));
    assert!(matches!(hrbac.and("", "func"), Err(HrbacError::EmptyParameter(_))));
    assert!(matches!(hrbac.and("func", "nope"), Err(HrbacError::MissingFunction(_))));
    assert!(matches!(hrbac.not("nope"), Err(HrbacError::MissingFunction(_))));
}

// ============================================================================
// GRANTING
// ============================================================================

#[tokio::test]
async fn test_function_grant_and_deny() {
    let hrbac: Hrbac<Value> = Hrbac::new();
    hrbac.add_function("func", is_role("admin")).unwrap();

    assert!(holds(&hrbac, "func", &request("admin", "GET")).await);
    assert!(!holds(&hrbac, "func", &request("admino", "GET")).await);
}

#[tokio::test]
async fn test_labels_and_lambdas_mix() {
    let hrbac: Hrbac<Value> = Hrbac::new();
    hrbac.add_function("is admin", is_role("admin")).unwrap();
    hrbac.add_function("is PUT", is_method("PUT")).unwrap();

    let rules = [
        ("or label/lambda", hrbac.or("is admin", is_method("PUT")).unwrap()),
        ("or lambda/label", hrbac.or(is_role("admin"), "is PUT").unwrap()),
        ("and label/lambda", hrbac.and("is admin", is_method("PUT")).unwrap()),
        ("and lambda/label", hrbac.and(is_role("admin"), "is PUT").unwrap()),
        ("not label", hrbac.not("is PUT").unwrap()),
        ("not lambda", hrbac.not(is_role("admin")).unwrap()),
    ];
    for (label, rule) in rules {
        hrbac.add_function(label, rule).unwrap();
    }

    let cases = [("admin", "PUT"), ("admin", "GET"), ("user", "PUT"), ("user", "GET")];
    for (role, method) in cases {
        let req = request(role, method);
        let admin = role == "admin";
        let put = method == "PUT";

        assert_eq!(holds(&hrbac, "or label/lambda", &req).await, admin || put);
        assert_eq!(holds(&hrbac, "or lambda/label", &req).await, admin || put);
        assert_eq!(holds(&hrbac, "and label/lambda", &req).await, admin && put);
        assert_eq!(holds(&hrbac, "and lambda/label", &req).await, admin && put);
        assert_eq!(holds(&hrbac, "not label", &req).await, !put);
        assert_eq!(holds(&hrbac, "not lambda", &req).await, !admin);
    }
}

#[tokio::test]
async fn test_complex_combination() {
    let hrbac: Hrbac<Value> = Hrbac::new();
    hrbac.add_function("is admin", is_role("admin")).unwrap();
    hrbac.add_function("is user", is_role("user")).unwrap();
    hrbac.add_function("is PUT", is_method("PUT")).unwrap();

    let rule = hrbac
        .or("is admin", hrbac.and("is user", hrbac.not("is PUT").unwrap()).unwrap())
        .unwrap();
    hrbac.add_function("func", rule).unwrap();

    assert!(holds(&hrbac, "func", &request("admin", "GET")).await);
    assert!(holds(&hrbac, "func", &request("admin", "PUT")).await);
    assert!(holds(&hrbac, "func", &request("user", "GET")).await);
    assert!(!holds(&hrbac, "func", &request("user", "PUT")).await);
    assert!(!holds(&hrbac, "func", &request("guest", "GET")).await);
}

#[tokio::test]
async fn test_roles_and_functions_combined() {
    let hrbac: Hrbac<Value> = Hrbac::new();
    hrbac.add_role("user", Parents::None).unwrap();
    hrbac.add_role("admin", "user").unwrap();
    hrbac
        .add_function(
            "is group owner",
            Predicate::deferred(|req: &Value, _: &()| {
                Box::pin(async move { Ok(req["params"]["groupId"] == 10) })
            }),
        )
        .unwrap();

    let rule = hrbac
        .or("admin", hrbac.and("user", "is group owner").unwrap())
        .unwrap();
    assert_eq!(rule.mode(), ExecutionMode::Deferred);
    hrbac.add_function("is admin or group owner", rule).unwrap();

    let req = |role: &str, group: u32| {
        json!({ "user": { "role": role }, "params": { "groupId": group } })
    };
    assert!(holds(&hrbac, "is admin or group owner", &req("admin", 9)).await);
    assert!(holds(&hrbac, "is admin or group owner", &req("user", 10)).await);
    assert!(!holds(&hrbac, "is admin or group owner", &req("user", 9)).await);
}

// ============================================================================
// EXECUTION MODES
// ============================================================================

#[test]
fn test_immediate_rules_stay_immediate() {
    let hrbac: Hrbac<Value> = Hrbac::new();
    hrbac.add_role("admin", Parents::None).unwrap();
    hrbac.add_function("is admin", is_role("admin")).unwrap();

    let rule = hrbac.or("admin", hrbac.not("is admin").unwrap()).unwrap();
    assert_eq!(rule.mode(), ExecutionMode::Immediate);

    // No runtime needed
    let guard = hrbac.middleware(rule, None).unwrap();
    let outcome = guard.evaluate_now(&request("admin", "GET"), &()).unwrap();
    assert!(outcome.is_granted());
}

#[tokio::test]
async fn test_second_operand_not_evaluated_when_decided() {
    let hrbac: Hrbac<Value> = Hrbac::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    hrbac
        .add_function(
            "counted",
            Predicate::deferred(move |_: &Value, _: &()| {
                let counter = counter.clone();
                Box::pin(async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(true)
                })
            }),
        )
        .unwrap();

    let short_or = hrbac.or(Predicate::<Value>::constant(true), "counted").unwrap();
    let short_and = hrbac.and(Predicate::<Value>::constant(false), "counted").unwrap();
    let req = json!({});

    assert!(short_or.evaluate(&req, &()).await.unwrap());
    assert!(!short_and.evaluate(&req, &()).await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    let full_and = hrbac.and(Predicate::<Value>::constant(true), "counted").unwrap();
    assert!(full_and.evaluate(&req, &()).await.unwrap());
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_predicates_can_use_context_errors() {
    let hrbac: Hrbac<Value> = Hrbac::new();
    hrbac
        .add_function(
            "owns group",
            Predicate::immediate(|req: &Value, _: &()| {
                let group = req
                    .pointer("/params/groupId")
                    .and_then(Value::as_u64)
                    .context("request has no group id")?;
                Ok(group == 10)
            }),
        )
        .unwrap();

    let predicate = hrbac.predicate("owns group").unwrap();
    let err = predicate.evaluate(&json!({}), &()).await.unwrap_err();
    assert!(!err.is_role_error());
    assert_eq!(err.to_string(), "request has no group id");
}
