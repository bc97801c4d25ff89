//! End-to-end compilation and invocation through `DetachedHost`.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use actionkit::{
    ActionBuilder, ActionCompiler, ActionDefinition, Arguments, BindingSpec, CollectingSink,
    CompileError, DetachedHost, DispatchError, HandlerRegistry, InvocationStrategy, ReturnShape,
    Value,
};

fn compiler() -> ActionCompiler {
    ActionCompiler::new().with_registry(Arc::new(HandlerRegistry::new()))
}

fn args(values: Vec<Value>) -> Arguments {
    Arguments::from_values(values)
}

fn get_user_name() -> ActionDefinition {
    ActionBuilder::get("/users/{userId}")
        .using(BindingSpec::route::<i32>("userId"))
        .to(|id: i32| id.to_string())
        .build()
}

#[tokio::test]
async fn route_parameter_result_is_returned() {
    let endpoint = compiler().compile(get_user_name(), None).unwrap();
    assert_eq!(endpoint.name, "[GET]/users/{userId}");
    assert_eq!(endpoint.action_method_name, "HandlerAction");

    let outcome = endpoint
        .invoke(args(vec![Arc::new(42i32)]), &DetachedHost::new())
        .await
        .unwrap();
    assert_eq!(
        outcome.downcast_ref::<String>().map(String::as_str),
        Some("42")
    );

    let immediate = endpoint
        .unit
        .invoke_immediate(args(vec![Arc::new(7i32)]), &DetachedHost::new())
        .unwrap();
    assert_eq!(
        immediate.downcast_ref::<String>().map(String::as_str),
        Some("7")
    );
}

#[test]
fn unknown_route_parameter_is_rejected() {
    let registry = Arc::new(HandlerRegistry::new());
    let def = ActionBuilder::get("/users/{id}")
        .using(BindingSpec::route::<i32>("userId"))
        .to(|id: i32| id.to_string())
        .build();

    let err = ActionCompiler::new()
        .with_registry(registry.clone())
        .compile(def, None)
        .unwrap_err();
    match err {
        CompileError::RouteParameterMismatch(e) => {
            assert_eq!(e.parameter, "userId");
            assert_eq!(e.endpoint, "[GET]/users/{id}");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(registry.is_empty(), "no logic may be registered for a rejected endpoint");
}

#[test]
fn lone_side_effect_fails_validation() {
    let def = ActionBuilder::post("/audit").side_effect(|| ()).build();
    let err = compiler().compile(def, None).unwrap_err();
    let CompileError::Validation(e) = err else {
        panic!("expected a validation error");
    };
    assert!(e
        .errors
        .iter()
        .any(|m| m.contains("side-effect step cannot terminate")));
}

#[test]
fn co_occurring_violations_are_all_reported() {
    let mut def = ActionBuilder::get("/x")
        .to(|| 1u8)
        .using(BindingSpec::previous::<u8>())
        .side_effect(|_v: u8| ())
        .build();
    def.steps[0].return_type = None;

    let CompileError::Validation(e) = compiler().compile(def, None).unwrap_err() else {
        panic!("expected a validation error");
    };
    assert_eq!(e.errors.len(), 3, "{:?}", e.errors);

    let empty = ActionDefinition::new(http::Method::GET, "/none");
    let CompileError::Validation(e) = compiler().compile(empty, None).unwrap_err() else {
        panic!("expected a validation error");
    };
    assert_eq!(
        e.errors,
        vec!["Action definition must contain at least one handler step"]
    );
}

#[tokio::test]
async fn compiling_twice_yields_independent_endpoints() {
    let registry = Arc::new(HandlerRegistry::new());
    let compiler = ActionCompiler::new().with_registry(registry.clone());
    let def = get_user_name();

    let first = compiler.compile(def.clone(), None).unwrap();
    let second = compiler.compile(def, None).unwrap();

    assert_ne!(first.unit.handler_keys(), second.unit.handler_keys());
    assert_ne!(first.unit.type_name(), second.unit.type_name());
    assert_eq!(registry.len(), 2);

    let host = DetachedHost::new();
    let (a, b) = tokio::join!(
        first.invoke(args(vec![Arc::new(1i32)]), &host),
        second.invoke(args(vec![Arc::new(2i32)]), &host),
    );
    assert_eq!(a.unwrap().downcast_ref::<String>().map(String::as_str), Some("1"));
    assert_eq!(b.unwrap().downcast_ref::<String>().map(String::as_str), Some("2"));
}

#[tokio::test]
async fn chain_equals_manual_composition() {
    let f = |a: i32, b: i32| a + b;
    let g = |x: i32, scale: i32| x * scale;
    let h = |y: i32| format!("={y}");

    let def = ActionBuilder::get("/calc/{a}/{b}")
        .using(BindingSpec::route::<i32>("a"))
        .using(BindingSpec::route::<i32>("b"))
        .to(f)
        .using(BindingSpec::previous::<i32>())
        .using(BindingSpec::query::<i32>("scale"))
        .to(g)
        .using(BindingSpec::previous::<i32>())
        .to(h)
        .build();
    let endpoint = compiler().compile(def, None).unwrap();
    assert_eq!(endpoint.unit.parameters().len(), 3);

    for (a, b, scale) in [(1, 2, 3), (-4, 4, 9), (10, 0, -1)] {
        let out = endpoint
            .invoke(
                args(vec![Arc::new(a), Arc::new(b), Arc::new(scale)]),
                &DetachedHost::new(),
            )
            .await
            .unwrap();
        assert_eq!(out.downcast_ref::<String>(), Some(&h(g(f(a, b), scale))));
    }
}

#[tokio::test]
async fn suspending_steps_complete_in_order() {
    let log = Arc::new(Mutex::new(Vec::<&'static str>::new()));

    let (l1, l2, l3) = (log.clone(), log.clone(), log.clone());
    let def = ActionBuilder::get("/slow")
        .to_async(move || {
            let log = l1.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(30)).await;
                log.lock().unwrap().push("first");
                1i32
            }
        })
        .using(BindingSpec::previous::<i32>())
        .to(move |v: i32| {
            l2.lock().unwrap().push("second");
            v + 1
        })
        .using(BindingSpec::previous::<i32>())
        .to_async(move |v: i32| {
            let log = l3.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                log.lock().unwrap().push("third");
                v * 10
            }
        })
        .build();

    let endpoint = compiler().compile(def, None).unwrap();
    assert_eq!(endpoint.unit.method.returns, ReturnShape::Suspending);
    assert_eq!(endpoint.unit.method.strategy, InvocationStrategy::Sequenced);

    let out = endpoint
        .invoke(Arguments::default(), &DetachedHost::new())
        .await
        .unwrap();
    assert_eq!(out.downcast_ref::<i32>(), Some(&20));
    assert_eq!(*log.lock().unwrap(), vec!["first", "second", "third"]);

    let err = endpoint
        .unit
        .invoke_immediate(Arguments::default(), &DetachedHost::new())
        .unwrap_err();
    assert!(matches!(err, DispatchError::WouldSuspend));
}

#[tokio::test]
async fn single_suspending_step_uses_direct_strategy() {
    let def = ActionBuilder::get("/ping/{n}")
        .using(BindingSpec::route::<u32>("n"))
        .to_async(|n: u32| async move { n + 1 })
        .build();
    let endpoint = compiler().compile(def, None).unwrap();
    assert_eq!(endpoint.unit.method.strategy, InvocationStrategy::Direct);

    let out = endpoint
        .invoke(args(vec![Arc::new(41u32)]), &DetachedHost::new())
        .await
        .unwrap();
    assert_eq!(out.downcast_ref::<u32>(), Some(&42));
}

#[test]
fn name_casing_never_adds_a_slot() {
    for spelling in ["userId", "USERID", "userid", "UserId"] {
        let def = ActionBuilder::get("/users/{userId}")
            .using(BindingSpec::route::<i32>("userId"))
            .to(|id: i32| id)
            .using(BindingSpec::route::<i32>(spelling))
            .using(BindingSpec::previous::<i32>())
            .to(|a: i32, b: i32| a + b)
            .build();
        let endpoint = compiler().compile(def, None).unwrap();
        let params = endpoint.unit.parameters();
        assert_eq!(params.len(), 1, "spelling {spelling}");
        assert_eq!(params[0].name, "userId");
    }
}

#[tokio::test]
async fn defaults_fill_missing_arguments() {
    let def = ActionBuilder::get("/items")
        .using(BindingSpec::query::<u32>("page").with_default(1u32))
        .to(|page: u32| page)
        .build();
    let endpoint = compiler().compile(def, None).unwrap();
    assert!(endpoint.unit.parameters()[0].optional);

    let out = endpoint
        .invoke(Arguments::default(), &DetachedHost::new())
        .await
        .unwrap();
    assert_eq!(out.downcast_ref::<u32>(), Some(&1));
}

#[tokio::test]
async fn missing_argument_is_a_dispatch_error() {
    let endpoint = compiler().compile(get_user_name(), None).unwrap();
    let err = endpoint
        .invoke(Arguments::default(), &DetachedHost::new())
        .await
        .unwrap_err();
    assert!(matches!(err, DispatchError::MissingArgument { position: 1 }));
}

#[test]
fn diagnostics_reach_the_sink() {
    let sink = CollectingSink::new();
    compiler().compile(get_user_name(), Some(&sink)).unwrap();
    let records = sink.records();
    assert!(!records.is_empty());
    assert!(records.iter().all(|r| r.endpoint == "[GET]/users/{userId}"));
    assert!(records
        .iter()
        .any(|r| r.message == "synthesized dispatch unit" && r.field("strategy") == Some("Sequenced")));
}
