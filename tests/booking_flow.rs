use std::net::SocketAddr;
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls, SimpleQueryMessage};
use ulid::Ulid;

use bookd::tenant::TenantManager;
use bookd::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<TenantManager>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("bookd_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 1000));

    let tm2 = tm.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm2.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "bookd".to_string(), None).await;
            });
        }
    });

    (addr, tm)
}

async fn connect(addr: SocketAddr) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("test")
        .user("bookd")
        .password("bookd");

    let (client, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });
    client
}

const SETTINGS: &str = r#"{
    "timezone": "UTC",
    "bufferMinutes": 15,
    "minNoticeHours": 0,
    "maxDaysAhead": 60,
    "maxOrdersPerSlot": 1,
    "businessHours": {
        "monday":    { "open": "09:00", "close": "17:00" },
        "tuesday":   { "open": "09:00", "close": "17:00" },
        "wednesday": { "open": "09:00", "close": "17:00" },
        "thursday":  { "open": "09:00", "close": "17:00" },
        "friday":    { "open": "09:00", "close": "17:00" },
        "saturday":  { "open": "09:00", "close": "17:00" },
        "sunday":    { "open": "09:00", "close": "17:00" }
    }
}"#;

fn service_doc(id: Ulid) -> String {
    format!(
        r#"{{"id":"{id}","name":"Wash & Fold Dropoff","serviceType":"dropoff","pricingModel":"per_bag","durationMinutes":60}}"#
    )
}

async fn provision(client: &tokio_postgres::Client) -> Ulid {
    client
        .batch_execute(&format!(
            "UPDATE settings SET document = '{}'",
            SETTINGS.replace('\n', " ")
        ))
        .await
        .unwrap();

    let sid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO services (id, document) VALUES ('{sid}', '{}')",
            service_doc(sid)
        ))
        .await
        .unwrap();
    sid
}

fn test_date() -> NaiveDate {
    Utc::now().date_naive() + Duration::days(7)
}

/// Collect the `time` column of a slots result.
async fn slot_times(client: &tokio_postgres::Client, sid: Ulid, date: NaiveDate) -> Vec<String> {
    let messages = client
        .simple_query(&format!(
            "SELECT * FROM slots WHERE service_id = '{sid}' AND date = '{date}'"
        ))
        .await
        .unwrap();
    messages
        .iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row.get(2).unwrap().to_string()),
            _ => None,
        })
        .collect()
}

fn insert_booking_sql(id: Ulid, sid: Ulid, date: NaiveDate, time: &str, email: &str) -> String {
    format!(
        r#"INSERT INTO bookings (id, service_id, date, time, name, phone, email, details)
           VALUES ('{id}', '{sid}', '{date}', '{time}', 'Ada Lovelace', '555-0100', '{email}', '{{"dropoff": {{"bagCount": 2}}}}')"#
    )
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn end_to_end_booking_flow() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let sid = provision(&client).await;
    let date = test_date();

    // Slot listing: 09:00 first, nothing past the duration+buffer boundary.
    let slots = slot_times(&client, sid, date).await;
    assert!(!slots.is_empty());
    assert_eq!(slots[0], "09:00");
    assert!(slots.contains(&"10:00".to_string()));
    assert!(slots.iter().all(|s| s.as_str() <= "15:45"));

    // Book 10:00.
    let booking_id = Ulid::new();
    client
        .batch_execute(&insert_booking_sql(
            booking_id,
            sid,
            date,
            "10:00",
            "ada@example.com",
        ))
        .await
        .unwrap();

    // The same slot no longer lists.
    let slots = slot_times(&client, sid, date).await;
    assert!(!slots.contains(&"10:00".to_string()));

    // A second customer racing for the same slot gets the retryable
    // conflict class.
    let err = client
        .batch_execute(&insert_booking_sql(
            Ulid::new(),
            sid,
            date,
            "10:00",
            "bob@example.com",
        ))
        .await
        .unwrap_err();
    let code = err.code().expect("expected a database error");
    assert_eq!(code.code(), "40001");

    // Customer lookup needs both fields.
    let rows = client
        .simple_query("SELECT * FROM bookings WHERE email = 'ada@example.com' AND phone = '555-0100'")
        .await
        .unwrap();
    let data: Vec<_> = rows
        .iter()
        .filter_map(|m| match m {
            SimpleQueryMessage::Row(row) => Some(row),
            _ => None,
        })
        .collect();
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].get(0).unwrap(), booking_id.to_string());
    assert_eq!(data[0].get(4).unwrap(), "confirmed");

    // Reschedule in place, authenticated by email.
    client
        .batch_execute(&format!(
            "UPDATE bookings SET date = '{date}', time = '11:30' WHERE id = '{booking_id}' AND email = 'ada@example.com'"
        ))
        .await
        .unwrap();
    let slots = slot_times(&client, sid, date).await;
    assert!(slots.contains(&"10:00".to_string())); // vacated
    assert!(!slots.contains(&"11:30".to_string()));

    // Wrong identity cannot cancel.
    let err = client
        .batch_execute(&format!(
            "DELETE FROM bookings WHERE id = '{booking_id}' AND email = 'mallory@example.com'"
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code().unwrap().code(), "42501");

    // Cancel flips status and frees the slot; the record survives.
    client
        .batch_execute(&format!(
            "DELETE FROM bookings WHERE id = '{booking_id}' AND email = 'ada@example.com'"
        ))
        .await
        .unwrap();
    let slots = slot_times(&client, sid, date).await;
    assert!(slots.contains(&"11:30".to_string()));

    let rows = client
        .simple_query("SELECT * FROM bookings WHERE email = 'ada@example.com' AND phone = '555-0100'")
        .await
        .unwrap();
    let status = rows
        .iter()
        .find_map(|m| match m {
            SimpleQueryMessage::Row(row) => row.get(4).map(|s| s.to_string()),
            _ => None,
        })
        .unwrap();
    assert_eq!(status, "cancelled");
}

#[tokio::test]
async fn blocked_date_lists_no_slots() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let date = test_date();

    let mut settings: serde_json::Value = serde_json::from_str(SETTINGS).unwrap();
    settings["blockedDates"] = serde_json::json!([date.to_string()]);
    client
        .batch_execute(&format!("UPDATE settings SET document = '{settings}'"))
        .await
        .unwrap();

    let sid = Ulid::new();
    client
        .batch_execute(&format!(
            "INSERT INTO services (id, document) VALUES ('{sid}', '{}')",
            service_doc(sid)
        ))
        .await
        .unwrap();

    assert!(slot_times(&client, sid, date).await.is_empty());
    // The next day is unaffected.
    assert!(!slot_times(&client, sid, date + Duration::days(1)).await.is_empty());
}

#[tokio::test]
async fn extended_protocol_slot_query() {
    let (addr, _tm) = start_test_server().await;
    let client = connect(addr).await;
    let sid = provision(&client).await;
    let date = test_date();

    let rows = client
        .query(
            "SELECT * FROM slots WHERE service_id = $1 AND date = $2",
            &[&sid.to_string(), &date.to_string()],
        )
        .await
        .unwrap();
    assert!(!rows.is_empty());
    let first: &str = rows[0].get(2);
    assert_eq!(first, "09:00");
}

#[tokio::test]
async fn tenants_are_isolated_by_database_name() {
    let (addr, _tm) = start_test_server().await;

    let client_a = connect(addr).await;
    let sid = provision(&client_a).await;

    // Same server, different database → different tenant engine.
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname("other_tenant")
        .user("bookd")
        .password("bookd");
    let (client_b, connection) = config.connect(NoTls).await.unwrap();
    tokio::spawn(async move {
        let _ = connection.await;
    });

    let err = client_b
        .simple_query(&format!(
            "SELECT * FROM slots WHERE service_id = '{sid}' AND date = '{}'",
            test_date()
        ))
        .await
        .unwrap_err();
    assert_eq!(err.code().unwrap().code(), "42704"); // unknown service here
}
