use std::ops::ControlFlow;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use futures::StreamExt;
use serde::Deserialize;
use serde_json::{Value, json};

use super::*;
use crate::error::DataApiError;
use crate::testing::{MockTransport, collection_target, doc, mock_client, paged_find_server};

fn cursor_over(transport: &Arc<MockTransport>) -> FindCursor<Document> {
    FindCursor::new(
        mock_client(transport),
        collection_target(),
        FindQuery::new(Document::new(), FindOptions::default()),
    )
}

fn ids(docs: &[Document]) -> Vec<u64> {
    docs.iter().filter_map(|d| d["_id"].as_u64()).collect()
}

#[tokio::test]
async fn test_two_pages_then_exhausted() {
    let transport = Arc::new(MockTransport::new(paged_find_server(25, 20)));
    let mut cursor = cursor_over(&transport);

    let docs = cursor.to_vec().await.unwrap();
    assert_eq!(docs.len(), 25);
    assert_eq!(ids(&docs), (0..25).collect::<Vec<_>>());
    assert_eq!(transport.call_count(), 2);

    assert!(cursor.next().await.unwrap().is_none());
    assert_eq!(transport.call_count(), 2);
    assert_eq!(cursor.state(), CursorState::Closed);
}

#[tokio::test]
async fn test_exhausted_cursor_does_no_more_io() {
    let transport = Arc::new(MockTransport::new(paged_find_server(3, 20)));
    let mut cursor = cursor_over(&transport);

    for _ in 0..3 {
        assert!(cursor.next().await.unwrap().is_some());
    }
    assert!(cursor.next().await.unwrap().is_none());
    assert_eq!(cursor.state(), CursorState::Exhausted);

    for _ in 0..5 {
        assert!(cursor.next().await.unwrap().is_none());
        assert!(!cursor.has_next().await.unwrap());
    }
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_first_page_has_no_token_and_later_pages_echo_it() {
    let transport = Arc::new(MockTransport::new(paged_find_server(45, 20)));
    let mut cursor = cursor_over(&transport);
    cursor.to_vec().await.unwrap();

    let tokens: Vec<Value> = transport
        .calls()
        .iter()
        .map(|c| c["find"]["options"]["pageState"].clone())
        .collect();
    assert_eq!(tokens, vec![Value::Null, json!("20"), json!("40")]);
}

#[tokio::test]
async fn test_rewind_replays_identical_fetches() {
    let transport = Arc::new(MockTransport::new(paged_find_server(30, 10)));
    let mut cursor = cursor_over(&transport)
        .filter(doc(json!({"kind": "a"})))
        .unwrap()
        .include_sort_vector(true)
        .unwrap();

    let first = cursor.to_vec().await.unwrap();
    let original_calls = transport.calls();

    // Partially consume a second time, then rewind mid-iteration.
    cursor.rewind();
    assert_eq!(cursor.state(), CursorState::Unstarted);
    cursor.next().await.unwrap();
    cursor.rewind();

    let second = cursor.to_vec().await.unwrap();
    assert_eq!(first, second);

    let replayed = transport.calls();
    let tail = &replayed[replayed.len() - original_calls.len()..];
    assert_eq!(tail, original_calls.as_slice());
}

#[tokio::test]
async fn test_rewind_drops_mapping_steps() {
    let transport = Arc::new(MockTransport::new(paged_find_server(3, 20)));
    let mut cursor = cursor_over(&transport)
        .limit(2)
        .unwrap()
        .map(|mut d: Document| {
            d.insert("seen".to_string(), json!(true));
            d
        })
        .unwrap();
    assert_eq!(cursor.next().await.unwrap(), Some(doc(json!({"_id": 0, "seen": true}))));

    cursor.rewind();
    assert_eq!(cursor.state(), CursorState::Unstarted);
    assert_eq!(cursor.to_vec().await.unwrap(), vec![doc(json!({"_id": 0})), doc(json!({"_id": 1}))]);
}

#[tokio::test]
async fn test_rewound_typed_cursor_delivers_raw_documents() {
    let transport = Arc::new(MockTransport::new(paged_find_server(3, 20)));
    let mut typed = cursor_over(&transport)
        .map(|d| d["_id"].as_u64().unwrap_or_default() * 10)
        .unwrap();
    assert_eq!(typed.next().await.unwrap(), Some(0));
    assert_eq!(typed.next().await.unwrap(), Some(10));

    let mut raw = typed.rewound();
    assert_eq!(raw.state(), CursorState::Unstarted);
    assert_eq!(raw.pages_fetched(), 0);
    assert_eq!(ids(&raw.to_vec().await.unwrap()), vec![0, 1, 2]);
    assert_eq!(transport.call_count(), 2);
}

#[tokio::test]
async fn test_configuration_rejected_after_start() {
    let transport = Arc::new(MockTransport::new(paged_find_server(5, 2)));
    let mut cursor = cursor_over(&transport);
    cursor.next().await.unwrap();

    let err = cursor.limit(1).unwrap_err();
    assert!(matches!(
        err,
        DataApiError::Cursor(CursorError::AlreadyStarted { operation: "limit" })
    ));
}

#[tokio::test]
async fn test_configuration_fails_before_any_io() {
    let transport = Arc::new(MockTransport::new(paged_find_server(5, 2)));
    let mut cursor = cursor_over(&transport);
    cursor.has_next().await.unwrap();
    let calls = transport.call_count();

    assert!(cursor.map(|d| d.len()).is_err());
    assert_eq!(transport.call_count(), calls);
}

#[tokio::test]
async fn test_limit_zero_is_unlimited() {
    let transport = Arc::new(MockTransport::new(paged_find_server(25, 10)));
    let mut cursor = cursor_over(&transport).limit(0).unwrap();
    assert_eq!(cursor.to_vec().await.unwrap().len(), 25);
}

#[tokio::test]
async fn test_limit_caps_delivery_across_pages() {
    let transport = Arc::new(MockTransport::new(paged_find_server(100, 4)));
    let mut cursor = cursor_over(&transport).limit(6).unwrap();

    let docs = cursor.to_vec().await.unwrap();
    assert_eq!(ids(&docs), vec![0, 1, 2, 3, 4, 5]);
    assert_eq!(transport.calls()[0]["find"]["options"]["limit"], json!(6));
}

#[tokio::test]
async fn test_has_next_does_not_consume() {
    let transport = Arc::new(MockTransport::new(paged_find_server(2, 20)));
    let mut cursor = cursor_over(&transport);

    assert!(cursor.has_next().await.unwrap());
    assert!(cursor.has_next().await.unwrap());
    assert_eq!(cursor.buffered_count(), 2);
    assert_eq!(cursor.next().await.unwrap().unwrap()["_id"], json!(0));
    assert_eq!(cursor.state(), CursorState::Started);
}

#[tokio::test]
async fn test_sort_vector_without_flag_does_no_io() {
    let transport = Arc::new(MockTransport::new(paged_find_server(5, 20)));
    let mut cursor = cursor_over(&transport);

    assert_eq!(cursor.get_sort_vector().await.unwrap(), None);
    assert_eq!(transport.call_count(), 0);
    assert_eq!(cursor.state(), CursorState::Unstarted);
}

#[tokio::test]
async fn test_sort_vector_fetches_first_page_and_caches() {
    let transport = Arc::new(MockTransport::new(paged_find_server(25, 20)));
    let mut cursor = cursor_over(&transport).include_sort_vector(true).unwrap();

    let vector = cursor.get_sort_vector().await.unwrap();
    assert_eq!(vector, Some(json!([0.25, 0.5])));
    assert_eq!(cursor.buffered_count(), 20);
    assert_eq!(transport.call_count(), 1);

    cursor.to_vec().await.unwrap();
    assert_eq!(cursor.get_sort_vector().await.unwrap(), Some(json!([0.25, 0.5])));
    assert_eq!(transport.call_count(), 2);
    assert!(transport.calls()[1]["find"]["options"]
        .get("includeSortVector")
        .is_none());
}

#[tokio::test]
async fn test_for_each_stops_early_and_closes() {
    let transport = Arc::new(MockTransport::new(paged_find_server(25, 20)));
    let mut cursor = cursor_over(&transport);
    let mut seen = 0;

    cursor
        .for_each(|_| {
            seen += 1;
            if seen == 3 {
                ControlFlow::Break(())
            } else {
                ControlFlow::Continue(())
            }
        })
        .await
        .unwrap();

    assert_eq!(seen, 3);
    assert_eq!(cursor.state(), CursorState::Closed);
    assert!(cursor.next().await.unwrap().is_none());
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_stream_yields_all_documents() {
    let transport = Arc::new(MockTransport::new(paged_find_server(25, 7)));
    let cursor = cursor_over(&transport)
        .map(|d| d["_id"].as_u64().unwrap_or_default())
        .unwrap();

    let items: Vec<u64> = cursor
        .into_stream()
        .map(|item| item.unwrap())
        .collect()
        .await;
    assert_eq!(items, (0..25).collect::<Vec<_>>());
    assert_eq!(transport.call_count(), 4);
}

#[tokio::test]
async fn test_stream_early_break_stops_fetching() {
    let transport = Arc::new(MockTransport::new(paged_find_server(100, 10)));
    let stream = cursor_over(&transport).into_stream();

    let first: Vec<_> = stream.take(3).collect().await;
    assert_eq!(first.len(), 3);
    assert_eq!(transport.call_count(), 1);
}

#[tokio::test]
async fn test_failed_fetch_keeps_state_for_retry() {
    let fail_next = Arc::new(AtomicBool::new(false));
    let server = paged_find_server(6, 3);
    let flag = fail_next.clone();
    let transport = Arc::new(MockTransport::new(move |target, command| {
        if flag.swap(false, Ordering::SeqCst) {
            return Err(MockTransport::http_error(502));
        }
        server(target, command)
    }));
    let mut cursor = cursor_over(&transport);

    for _ in 0..3 {
        cursor.next().await.unwrap();
    }
    fail_next.store(true, Ordering::SeqCst);
    assert!(cursor.next().await.unwrap_err().is_hard_failure());
    assert_eq!(cursor.buffered_count(), 0);

    let rest = cursor.to_vec().await.unwrap();
    assert_eq!(ids(&rest), vec![3, 4, 5]);

    let calls = transport.calls();
    assert_eq!(calls[1]["find"]["options"]["pageState"], json!("3"));
    assert_eq!(calls[2]["find"]["options"]["pageState"], json!("3"));
}

#[tokio::test]
async fn test_soft_error_on_fetch_is_raised() {
    let transport = Arc::new(MockTransport::new(|_, _| {
        Ok(json!({"errors": [{"errorCode": "INVALID_FILTER", "message": "bad filter"}]}))
    }));
    let mut cursor = cursor_over(&transport);

    let err = cursor.next().await.unwrap_err();
    assert!(matches!(err, DataApiError::Response(_)));
    assert_eq!(cursor.state(), CursorState::Started);
}

#[tokio::test]
async fn test_close_prevents_io() {
    let transport = Arc::new(MockTransport::new(paged_find_server(5, 20)));
    let mut cursor = cursor_over(&transport);
    cursor.close();

    assert!(cursor.next().await.unwrap().is_none());
    assert!(cursor.to_vec().await.unwrap().is_empty());
    assert_eq!(transport.call_count(), 0);
}

#[tokio::test]
async fn test_map_chain_and_clone_fresh() {
    #[derive(Debug, Deserialize, PartialEq)]
    struct Row {
        #[serde(rename = "_id")]
        id: u64,
    }

    let transport = Arc::new(MockTransport::new(paged_find_server(3, 20)));
    let mut typed = cursor_over(&transport)
        .deserialize_into::<Row>()
        .unwrap()
        .map(|row| row.id * 2)
        .unwrap();

    assert_eq!(typed.to_vec().await.unwrap(), vec![0, 2, 4]);

    let mut fresh = typed.clone_fresh();
    assert_eq!(fresh.state(), CursorState::Unstarted);
    assert_eq!(fresh.next().await.unwrap(), Some(doc(json!({"_id": 0}))));
}

#[tokio::test]
async fn test_consume_buffer_without_io() {
    let transport = Arc::new(MockTransport::new(paged_find_server(5, 20)));
    let mut cursor = cursor_over(&transport).limit(4).unwrap();
    assert!(cursor.consume_buffer(10).is_empty());

    cursor.has_next().await.unwrap();
    let taken = cursor.consume_buffer(3);
    assert_eq!(ids(&taken), vec![0, 1, 2]);
    assert_eq!(transport.call_count(), 1);

    assert_eq!(cursor.to_vec().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_distinct_flattens_arrays() {
    let transport = Arc::new(MockTransport::new(|_, _| {
        Ok(json!({"data": {
            "documents": [
                {"tags": ["a", "b"], "meta": {"color": "red"}},
                {"tags": ["b", "c"], "meta": {"color": "red"}},
                {"tags": "d", "meta": [{"color": "blue"}]}
            ],
            "nextPageState": null
        }}))
    }));

    let mut cursor = cursor_over(&transport);
    let tags = cursor.distinct("tags").await.unwrap();
    assert_eq!(tags, vec![json!("a"), json!("b"), json!("c"), json!("d")]);

    let mut cursor = cursor_over(&transport);
    let colors = cursor.distinct("meta.color").await.unwrap();
    assert_eq!(colors, vec![json!("red"), json!("blue")]);
}
