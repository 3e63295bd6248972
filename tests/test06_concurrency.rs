use sql_pipe::prelude::*;
use sql_pipe::test_utils::{ScriptedDriver, text_row};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_streams_use_their_own_connections() -> Result<(), SqlPipeError> {
    let driver = (0..16).fold(ScriptedDriver::new(), |d, i| {
        d.then_rows(vec![text_row(&format!("[{i}]"))])
    });
    let statement = Statement::new(driver.factory()).sql("SELECT * FROM Orders FOR JSON PATH");
    let options = StreamOptions::new().prefix("{\"d\":").suffix("}").default_text("[]");

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let statement = statement.clone();
        let options = options.clone();
        tasks.push(tokio::spawn(async move {
            statement.stream_to_string(&options).await
        }));
    }

    let mut bodies = Vec::new();
    for task in tasks {
        let body = task
            .await
            .map_err(|e| SqlPipeError::Other(e.to_string()))??;
        assert!(body.starts_with("{\"d\":[") && body.ends_with("]}"));
        bodies.push(body);
    }
    bodies.sort();
    bodies.dedup();

    assert_eq!(bodies.len(), 16);
    assert_eq!(driver.connections_created(), 16);
    assert_eq!(driver.opens(), 16);
    assert_eq!(driver.closes(), 16);
    Ok(())
}

#[tokio::test]
async fn shared_connection_serializes_executions() -> Result<(), SqlPipeError> {
    let driver = ScriptedDriver::new();
    let statement = Statement::with_connection(driver.connection()).sql("SELECT 1");

    let (a, b) = tokio::join!(statement.exec(), statement.exec());
    a?;
    b?;

    assert_eq!(driver.connections_created(), 1);
    assert_eq!(driver.opens(), 2);
    assert_eq!(driver.closes(), 2);
    Ok(())
}
