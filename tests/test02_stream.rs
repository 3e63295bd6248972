use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use sql_pipe::prelude::*;
use sql_pipe::test_utils::{
    FailingWriter, ScriptedDriver, Step, binary_row, int_row, null_row, text_row,
};

fn statement(driver: &ScriptedDriver) -> Statement {
    Statement::new(driver.factory()).sql("SELECT * FROM Orders FOR JSON PATH")
}

#[tokio::test]
async fn empty_result_writes_the_default() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new().then_rows(vec![]);
    let mut out = Vec::new();
    statement(&driver)
        .stream(&mut out, &StreamOptions::new().default_text("[]"))
        .await?;
    assert_eq!(out, b"[]");
    Ok(())
}

#[tokio::test]
async fn rows_are_wrapped_in_prefix_and_suffix() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new().then_rows(vec![text_row("ABC")]);
    let options = StreamOptions::new().prefix("{\"data\":").suffix("}");
    let mut out = Vec::new();
    statement(&driver).stream(&mut out, &options).await?;
    assert_eq!(out, b"{\"data\":ABC}");
    Ok(())
}

#[tokio::test]
async fn chunks_are_concatenated() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new().then_rows(vec![
        text_row("[{\"id\":1},"),
        null_row(),
        text_row("{\"id\":2}]"),
    ]);
    let options = StreamOptions::new().prefix("<").suffix(">").default_text("[]");
    let body = statement(&driver).stream_to_string(&options).await?;
    assert_eq!(body, "<[{\"id\":1},{\"id\":2}]>");
    Ok(())
}

#[tokio::test]
async fn default_is_wrapped_too() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new();
    let options = StreamOptions::new()
        .prefix("{\"data\":")
        .suffix("}")
        .default_text("null");
    let body = statement(&driver).stream_to_string(&options).await?;
    assert_eq!(body, "{\"data\":null}");
    Ok(())
}

#[tokio::test]
async fn nothing_is_written_without_rows_or_default() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new().then_rows(vec![null_row()]);
    let options = StreamOptions::new().prefix("[").suffix("]");
    let mut out = Vec::new();
    statement(&driver).stream(&mut out, &options).await?;
    assert!(out.is_empty());
    Ok(())
}

#[tokio::test]
async fn binary_cells_are_written_verbatim() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new().then_rows(vec![binary_row(&[0xDE, 0xAD]), binary_row(&[0xBE])]);
    let mut out = Vec::new();
    statement(&driver)
        .stream(&mut out, &StreamOptions::new().default_binary(vec![0u8]))
        .await?;
    assert_eq!(out, [0xDE, 0xAD, 0xBE]);
    Ok(())
}

#[tokio::test]
async fn utf16_output() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new().then_rows(vec![text_row("hi")]);
    let options = StreamOptions::new()
        .prefix("[")
        .suffix("]")
        .encoding(OutputEncoding::Utf16Le);
    let mut out = Vec::new();
    statement(&driver).stream(&mut out, &options).await?;
    assert_eq!(out, b"[\0h\0i\0]\0");

    let err = statement(&driver)
        .stream_to_string(&options)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPipeError::InvalidConfiguration(_)));
    Ok(())
}

#[tokio::test]
async fn non_text_column_fails_without_output() {
    let driver = ScriptedDriver::new().then_rows(vec![int_row(5)]);
    let options = StreamOptions::new().prefix("[").suffix("]").default_text("[]");
    let mut out = Vec::new();

    let err = statement(&driver)
        .stream(&mut out, &options)
        .await
        .unwrap_err();
    match err {
        SqlPipeError::UnsupportedColumnType(name) => assert_eq!(name, "Int32"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert!(out.is_empty());
    assert_eq!(driver.executions(), 1);
    assert_eq!(driver.closes(), 1);
}

#[tokio::test]
async fn handled_error_skips_default_output() -> Result<(), SqlPipeError> {
    let handled = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&handled);
    let driver = ScriptedDriver::new().then_fail(SqlPipeError::Database(DbError::new(
        208,
        "Invalid object name 'Orders'",
    )));
    let mut out = Vec::new();

    statement(&driver)
        .on_error(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .stream(&mut out, &StreamOptions::new().default_text("[]"))
        .await?;

    assert!(out.is_empty());
    assert_eq!(handled.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn failure_after_output_leaves_the_suffix_off() {
    let driver = ScriptedDriver::new().then(Step::RowsThenFail(
        vec![text_row("[1,")],
        SqlPipeError::ConnectionError("connection reset".into()),
    ));
    let options = StreamOptions::new().prefix("<").suffix(">");
    let mut out = Vec::new();

    let err = statement(&driver)
        .stream(&mut out, &options)
        .await
        .unwrap_err();
    assert!(matches!(err, SqlPipeError::ConnectionError(_)));
    assert_eq!(out, b"<[1,");
    assert_eq!(driver.executions(), 1);
}

#[tokio::test]
async fn sink_errors_bypass_handlers() {
    let handled = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&handled);
    let driver = ScriptedDriver::new().then_rows(vec![text_row("[]")]);

    let err = statement(&driver)
        .on_error(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .stream(&mut FailingWriter, &StreamOptions::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        SqlPipeError::Sink {
            kind: std::io::ErrorKind::BrokenPipe,
            ..
        }
    ));
    assert_eq!(handled.load(Ordering::SeqCst), 0);
    assert_eq!(driver.closes(), 1);
}

#[tokio::test]
async fn repeated_streams_produce_identical_output() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new()
        .then_rows(vec![text_row("[1]")])
        .then_rows(vec![text_row("[1]")]);
    let statement = statement(&driver);
    let options = StreamOptions::new().prefix("{\"d\":").suffix("}").default_text("[]");

    let first = statement.stream_to_string(&options).await?;
    let second = statement.stream_to_string(&options).await?;
    assert_eq!(first, second);
    assert_eq!(first, "{\"d\":[1]}");
    Ok(())
}
