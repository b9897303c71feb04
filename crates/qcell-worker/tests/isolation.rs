//! Integration tests for isolated execution against the real worker binary.

use std::fs;
use std::thread;
use std::time::{Duration, Instant};

use qcell_core::cell::{ProcessContext, ReturnCode, Value};
use qcell_core::registry;
use qcell_core::runner::{IsolatedRunner, IsolatedTask, RunnerConfig, TableOp, execute_task};
use qcell_core::storage::{NodeKey, ResultHandle, Store, StoreConfig};
use qcell_core::table::{ColumnData, Table};
use qcell_core::Error;
use tempfile::TempDir;

const WORKER: &str = env!("CARGO_BIN_EXE_qcell-worker");

fn config() -> RunnerConfig {
    RunnerConfig::default()
        .with_timeout(Some(Duration::from_secs(30)))
        .with_worker_path(WORKER)
}

fn setup() -> (TempDir, IsolatedRunner) {
    let temp = TempDir::new().unwrap();
    let store = Store::open(StoreConfig::new(temp.path().join("store")).with_row_group_size(2))
        .unwrap();
    (temp, IsolatedRunner::new(store, config()))
}

fn put(store: &Store, node: &str, data: ColumnData) -> ResultHandle {
    ResultHandle::write(
        store.clone(),
        NodeKey::new("in", node).unwrap(),
        &Table::single("v", data),
        &[],
    )
    .unwrap()
}

#[test]
fn test_isolated_run_matches_in_process() {
    let (_temp, runner) = setup();
    let store = runner.store();
    let input = put(store, "a", ColumnData::Int(vec![5, 3, 9, 1, 7]));

    let isolated = IsolatedTask::new(
        "test",
        TableOp::SortValues {
            by: vec!["v".to_string()],
            ascending: false,
        },
        NodeKey::new("out", "isolated").unwrap(),
    )
    .input(&input);
    let mut local = isolated.clone();
    local.target = NodeKey::new("out", "local").unwrap();

    let handle = runner.run(isolated).unwrap();
    execute_task(store, &local).unwrap();

    assert_eq!(
        handle.table().unwrap(),
        store.read_table(&local.target).unwrap()
    );
    assert_eq!(
        handle.column("v").unwrap(),
        ColumnData::Int(vec![9, 7, 5, 3, 1])
    );
}

#[test]
fn test_timeout_kills_worker() {
    let (_temp, runner) = setup();
    let input = put(runner.store(), "a", ColumnData::Int(vec![1]));
    let target = NodeKey::new("out", "slow").unwrap();
    let task = IsolatedTask::new("test", TableOp::Delay { millis: 2_000 }, target.clone())
        .input(&input);

    let started = Instant::now();
    let result = runner.run_with_timeout(task, Some(Duration::from_millis(200)));

    assert!(matches!(result, Err(Error::Timeout { .. })));
    assert!(started.elapsed() < Duration::from_secs(2));
    assert!(!runner.store().exists(&target));
}

#[test]
fn test_worker_failure_is_reported() {
    let (_temp, runner) = setup();
    let task = IsolatedTask::new(
        "test",
        TableOp::Head { n: 1 },
        NodeKey::new("out", "never").unwrap(),
    )
    .input(NodeKey::new("in", "missing").unwrap());

    match runner.run(task) {
        Err(Error::WorkerFailure { message }) => assert!(message.contains("in/missing")),
        other => panic!("expected a worker failure, got {other:?}"),
    }
}

#[test]
fn test_kill_handle_stops_running_task() {
    let (_temp, runner) = setup();
    let input = put(runner.store(), "a", ColumnData::Int(vec![1]));
    let task = IsolatedTask::new(
        "test",
        TableOp::Delay { millis: 10_000 },
        NodeKey::new("out", "killed").unwrap(),
    )
    .input(&input);

    let kill = runner.kill_handle();
    let killer = thread::spawn(move || {
        thread::sleep(Duration::from_millis(500));
        kill.kill();
    });

    let started = Instant::now();
    let result = runner.run(task);
    killer.join().unwrap();

    assert!(matches!(result, Err(Error::WorkerFailure { .. })));
    assert!(started.elapsed() < Duration::from_secs(10));
}

/// Kill `caller`'s runs once one is in flight. Returns how many were hit.
fn kill_when_running(runner: &IsolatedRunner, caller: &str) -> usize {
    let kill = runner.kill_handle_for(caller);
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let killed = kill.kill();
        if killed > 0 || Instant::now() > deadline {
            return killed;
        }
        thread::sleep(Duration::from_millis(20));
    }
}

fn delay(caller: &str, millis: u64, input: &ResultHandle) -> IsolatedTask {
    IsolatedTask::new(
        caller,
        TableOp::Delay { millis },
        NodeKey::new("out", caller).unwrap(),
    )
    .input(input)
}

#[test]
fn test_finished_run_keeps_others_killable() {
    let (_temp, runner) = setup();
    let input = put(runner.store(), "a", ColumnData::Int(vec![1]));

    let slow = {
        let (runner, task) = (runner.clone(), delay("slow", 5_000, &input));
        thread::spawn(move || runner.run(task))
    };
    let quick = {
        let (runner, task) = (runner.clone(), delay("quick", 200, &input));
        thread::spawn(move || runner.run(task))
    };
    assert!(quick.join().unwrap().is_ok());

    let started = Instant::now();
    assert_eq!(kill_when_running(&runner, "slow"), 1);
    let result = slow.join().unwrap();
    assert!(matches!(result, Err(Error::WorkerFailure { .. })), "{result:?}");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn test_kill_reaches_only_its_caller() {
    let (_temp, runner) = setup();
    let input = put(runner.store(), "a", ColumnData::Int(vec![1]));

    let kept = {
        let (runner, task) = (runner.clone(), delay("kept", 1_500, &input));
        thread::spawn(move || runner.run(task))
    };
    let doomed = {
        let (runner, task) = (runner.clone(), delay("doomed", 10_000, &input));
        thread::spawn(move || runner.run(task))
    };

    assert_eq!(kill_when_running(&runner, "doomed"), 1);
    assert!(matches!(
        doomed.join().unwrap(),
        Err(Error::WorkerFailure { .. })
    ));
    let kept = kept.join().unwrap().unwrap();
    assert_eq!(kept.column("v").unwrap(), ColumnData::Int(vec![1]));
}

#[test]
fn test_stopping_one_cell_spares_its_neighbour() {
    let temp = TempDir::new().unwrap();
    let ctx =
        ProcessContext::from_config(StoreConfig::new(temp.path().join("store")), config()).unwrap();
    let data = put(ctx.store(), "a", ColumnData::Int(vec![1]));

    let mut stopped = registry::create("Sleep").unwrap();
    stopped.set_input("seconds", 10i64).unwrap();
    stopped.set_input("data", data.clone()).unwrap();
    let mut neighbour = registry::create("Sleep").unwrap();
    neighbour.set_input("seconds", 1i64).unwrap();
    neighbour.set_input("data", data).unwrap();

    let kill = stopped.kill_handle(&ctx);
    let stopped = {
        let ctx = ctx.clone();
        thread::spawn(move || {
            let code = stopped.process(&ctx);
            (code, stopped)
        })
    };
    let neighbour = {
        let ctx = ctx.clone();
        thread::spawn(move || {
            let code = neighbour.process(&ctx);
            (code, neighbour)
        })
    };

    let deadline = Instant::now() + Duration::from_secs(5);
    while kill.kill() == 0 && Instant::now() < deadline {
        thread::sleep(Duration::from_millis(20));
    }

    let (code, stopped) = stopped.join().unwrap();
    assert_eq!(code, ReturnCode::Unknown);
    assert!(stopped.status_message().contains("killed"));
    let (code, neighbour) = neighbour.join().unwrap();
    assert_eq!(code, ReturnCode::Ok, "{}", neighbour.status_message());
    assert_eq!(neighbour.output("done").unwrap(), &Value::Bool(true));
}

#[test]
fn test_handle_arithmetic() {
    let (_temp, runner) = setup();
    let a = put(runner.store(), "a", ColumnData::Int(vec![1, 2, 3]));
    let b = put(runner.store(), "b", ColumnData::Int(vec![10, 20, 30]));

    let sum = a.add(&runner, &b).unwrap();
    assert_eq!(sum.column("v").unwrap(), ColumnData::Int(vec![11, 22, 33]));

    let halves = sum.true_divide(&runner, 2i64).unwrap();
    assert_eq!(
        halves.column("v").unwrap(),
        ColumnData::Float(vec![5.5, 11.0, 16.5])
    );

    let big = a.gt(&runner, 1i64).unwrap();
    assert_eq!(
        big.column("v").unwrap(),
        ColumnData::Bool(vec![false, true, true])
    );

    // Same operation, same operands: same key.
    assert_eq!(a.add(&runner, &b).unwrap(), sum);
}

#[test]
fn test_table_cells_end_to_end() {
    let temp = TempDir::new().unwrap();
    let csv = temp.path().join("fruit.csv");
    fs::write(
        &csv,
        "name,qty\napple,3\nbanana,5\napple,1\ncherry,7\napple,2\n",
    )
    .unwrap();
    let ctx =
        ProcessContext::from_config(StoreConfig::new(temp.path().join("store")), config()).unwrap();

    let mut read = registry::create("Read_CSV").unwrap();
    read.set_input("csv", csv.to_str().unwrap()).unwrap();
    read.set_input("data_columns", vec!["qty"]).unwrap();
    assert_eq!(read.process(&ctx), ReturnCode::Ok, "{}", read.status_message());
    let data = read.output("dataframe").unwrap().clone();
    let Value::Table(ref handle) = data else {
        panic!("expected a table, got {data:?}");
    };
    assert_eq!(handle.key().file(), "fruit");
    assert_eq!(handle.row_count().unwrap(), 5);
    assert_eq!(handle.data_columns().unwrap()[0].name, "qty");

    let mut head = registry::create("Head").unwrap();
    head.set_input("data", data.clone()).unwrap();
    head.set_input("n", 2i64).unwrap();
    assert_eq!(head.process(&ctx), ReturnCode::Ok);
    let Some(top) = head.output("dataframe").unwrap().as_table() else {
        panic!("head produced no table");
    };
    assert_eq!(
        top.column("qty").unwrap(),
        ColumnData::Int(vec![3, 5])
    );

    let mut select = registry::create("Select").unwrap();
    select.set_input("data", data.clone()).unwrap();
    select.set_input("column", "qty").unwrap();
    select.set_input("op", ">=").unwrap();
    select.set_input("value", 3i64).unwrap();
    assert_eq!(select.process(&ctx), ReturnCode::Ok);
    let Some(selected) = select.output("dataframe").unwrap().as_table() else {
        panic!("select produced no table");
    };
    assert_eq!(
        selected.column("name").unwrap(),
        ColumnData::Text(vec![
            Some("apple".to_string()),
            Some("banana".to_string()),
            Some("cherry".to_string()),
        ])
    );

    let mut counts = registry::create("Value_Counts").unwrap();
    counts.set_input("series", data).unwrap();
    assert_eq!(counts.process(&ctx), ReturnCode::Ok);
    let Some(tally) = counts.output("series").unwrap().as_table() else {
        panic!("value counts produced no table");
    };
    assert_eq!(tally.column("count").unwrap(), ColumnData::Int(vec![3, 1, 1]));
}

#[test]
fn test_operator_cell_with_table_operand() {
    let temp = TempDir::new().unwrap();
    let ctx =
        ProcessContext::from_config(StoreConfig::new(temp.path().join("store")), config()).unwrap();
    let a = put(ctx.store(), "a", ColumnData::Int(vec![1, 2, 3]));

    let mut mul = registry::create("Mul").unwrap();
    mul.set_input("a", 10i64).unwrap();
    mul.set_input("b", a).unwrap();
    assert_eq!(mul.process(&ctx), ReturnCode::Ok, "{}", mul.status_message());
    let Some(product) = mul.output("result").unwrap().as_table() else {
        panic!("expected a table result");
    };
    assert_eq!(
        product.column("v").unwrap(),
        ColumnData::Int(vec![10, 20, 30])
    );
}

#[test]
fn test_sleep_cell_times_out_in_worker() {
    let temp = TempDir::new().unwrap();
    let ctx = ProcessContext::from_config(
        StoreConfig::new(temp.path().join("store")),
        config().with_timeout(Some(Duration::from_millis(200))),
    )
    .unwrap();
    let data = put(ctx.store(), "a", ColumnData::Int(vec![1]));

    let mut sleep = registry::create("Sleep").unwrap();
    sleep.set_input("seconds", 2i64).unwrap();
    sleep.set_input("data", data).unwrap();
    assert_eq!(sleep.process(&ctx), ReturnCode::Unknown);
    assert!(sleep.status_message().contains("timed out"));
    assert_eq!(sleep.output("done").unwrap(), &Value::Bool(false));
}
