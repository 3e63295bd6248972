use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use sql_pipe::prelude::*;
use sql_pipe::test_utils::{ScriptedDriver, int_row, row, text_row};

#[tokio::test]
async fn rows_reach_the_callback_in_order() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new().then_rows(vec![
        row(&["Id", "Name"], vec![ColumnValue::Int32(1), ColumnValue::Text("ann".into())]),
        row(&["Id", "Name"], vec![ColumnValue::Int32(2), ColumnValue::Null]),
    ]);
    let mut names = Vec::new();

    Statement::new(driver.factory())
        .sql("SELECT Id, Name FROM Customers")
        .map(|row| {
            let id = row.get("id").and_then(ColumnValue::as_i64).unwrap_or_default();
            let name = row.get("Name").and_then(ColumnValue::as_text).map(str::to_string);
            names.push((id, name));
            Ok(())
        })
        .await?;

    assert_eq!(names, vec![(1, Some("ann".to_string())), (2, None)]);
    assert_eq!(driver.closes(), 1);
    Ok(())
}

#[tokio::test]
async fn failing_callback_is_swallowed_by_handler() -> Result<(), SqlPipeError> {
    let handled = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&handled);
    let driver = ScriptedDriver::new().then_rows(vec![int_row(1), int_row(2), int_row(3)]);
    let mut calls = 0;

    Statement::new(driver.factory())
        .sql("SELECT Value FROM Numbers")
        .on_error(move |err| {
            assert!(matches!(err, SqlPipeError::Callback(_)));
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .map(|_| {
            calls += 1;
            Err(SqlPipeError::Callback("cannot process row".into()))
        })
        .await?;

    assert_eq!(calls, 1);
    assert_eq!(handled.load(Ordering::SeqCst), 1);
    assert_eq!(driver.executions(), 1);
    Ok(())
}

#[tokio::test]
async fn failing_callback_without_handler_is_returned() {
    let driver = ScriptedDriver::new().then_rows(vec![int_row(1)]);
    let err = Statement::new(driver.factory())
        .sql("SELECT Value FROM Numbers")
        .map(|_| Err(SqlPipeError::Callback("nope".into())))
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPipeError::Callback(_)));
}

#[tokio::test]
async fn error_accepting_callback_receives_execution_failure_once() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new()
        .then_fail(SqlPipeError::Database(DbError::new(229, "permission denied")));
    let mut rows = 0;
    let mut errors = Vec::new();

    Statement::new(driver.factory())
        .sql("SELECT * FROM Payroll")
        .map_with_error(|row, err| {
            match (row, err) {
                (Some(_), None) => rows += 1,
                (None, Some(err)) => errors.push(err.db_number()),
                _ => panic!("callback receives either a row or an error"),
            }
            Ok(())
        })
        .await?;

    assert_eq!(rows, 0);
    assert_eq!(errors, vec![Some(229)]);
    Ok(())
}

#[tokio::test]
async fn error_accepting_callback_hears_about_its_own_failure_once() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new().then_rows(vec![int_row(1), int_row(2)]);
    let mut rows = 0;
    let mut errors = 0;

    Statement::new(driver.factory())
        .sql("SELECT Value FROM Numbers")
        .map_with_error(|row, err| {
            if row.is_some() {
                rows += 1;
                return Err(SqlPipeError::Callback("bad value".into()));
            }
            if err.is_some() {
                errors += 1;
            }
            Ok(())
        })
        .await?;

    assert_eq!(rows, 1);
    assert_eq!(errors, 1);
    Ok(())
}

#[tokio::test]
async fn rethrown_error_still_reaches_the_callback() {
    let driver = ScriptedDriver::new().then_fail(SqlPipeError::Other("gone".into()));
    let mut errors = 0;

    let result = Statement::new(driver.factory())
        .sql("SELECT 1")
        .add_error_handler_builder(RethrowErrorHandler)
        .map_with_error(|_, err| {
            errors += usize::from(err.is_some());
            Ok(())
        })
        .await;

    assert!(matches!(result, Err(SqlPipeError::Other(_))));
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn callback_failing_on_the_error_is_returned() {
    let driver = ScriptedDriver::new().then_fail(SqlPipeError::Other("gone".into()));

    let err = Statement::new(driver.factory())
        .sql("SELECT 1")
        .map_with_error(|_, err| match err {
            Some(_) => Err(SqlPipeError::Callback("could not report".into())),
            None => Ok(()),
        })
        .await
        .unwrap_err();

    assert!(matches!(err, SqlPipeError::Callback(_)));
}

#[tokio::test]
async fn async_callbacks() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new()
        .then_rows(vec![text_row("a"), text_row("b")])
        .then_fail(SqlPipeError::Other("late".into()));
    let collected = Arc::new(Mutex::new(Vec::new()));
    let statement = Statement::new(driver.factory()).sql("SELECT Name FROM Letters");

    let sink = Arc::clone(&collected);
    statement
        .map_async(move |row| {
            let sink = Arc::clone(&sink);
            async move {
                let text = row.get_by_index(0).and_then(ColumnValue::as_text).unwrap_or("");
                sink.lock().unwrap().push(text.to_string());
                Ok::<(), SqlPipeError>(())
            }
        })
        .await?;
    assert_eq!(*collected.lock().unwrap(), vec!["a".to_string(), "b".to_string()]);

    let errors = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&errors);
    statement
        .map_async_with_error(move |_, err| {
            let counter = Arc::clone(&counter);
            async move {
                if err.is_some() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<(), SqlPipeError>(())
            }
        })
        .await?;
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    Ok(())
}
