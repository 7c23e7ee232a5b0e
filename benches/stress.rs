//! Latency harness: boots an in-process server, then hammers the booking
//! path and the slot listing path over a real pgwire connection.
//!
//! Run with `cargo bench`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::net::TcpListener;
use tokio_postgres::{Config, NoTls};
use ulid::Ulid;

use bookd::tenant::TenantManager;
use bookd::wire;

async fn start_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("bookd_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let tm = Arc::new(TenantManager::new(dir, 100_000));

    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let tm = tm.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, tm, "bookd".to_string(), None).await;
            });
        }
    });

    addr
}

async fn connect(addr: SocketAddr) -> tokio_postgres::Client {
    let mut config = Config::new();
    config
        .host(addr.ip().to_string())
        .port(addr.port())
        .dbname(format!("bench_{}", Ulid::new()))
        .user("bookd")
        .password("bookd");

    let (client, conn) = config.connect(NoTls).await.expect("connect failed");
    tokio::spawn(async move {
        if let Err(e) = conn.await {
            eprintln!("connection error: {e}");
        }
    });
    client
}

fn percentile(sorted: &[Duration], p: f64) -> Duration {
    if sorted.is_empty() {
        return Duration::ZERO;
    }
    let idx = ((sorted.len() as f64) * p / 100.0) as usize;
    sorted[idx.min(sorted.len() - 1)]
}

fn print_latency(label: &str, latencies: &mut [Duration]) {
    latencies.sort();
    let total: Duration = latencies.iter().sum();
    let avg = total / latencies.len() as u32;
    println!("  {label}:");
    println!(
        "    n={}, avg={:.2}ms, p50={:.2}ms, p95={:.2}ms, p99={:.2}ms, max={:.2}ms",
        latencies.len(),
        avg.as_secs_f64() * 1000.0,
        percentile(latencies, 50.0).as_secs_f64() * 1000.0,
        percentile(latencies, 95.0).as_secs_f64() * 1000.0,
        percentile(latencies, 99.0).as_secs_f64() * 1000.0,
        latencies.last().unwrap().as_secs_f64() * 1000.0,
    );
}

const SETTINGS: &str = r#"{"timezone":"UTC","bufferMinutes":15,"maxDaysAhead":366,"maxOrdersPerSlot":1,"businessHours":{"monday":{"open":"09:00","close":"17:00"},"tuesday":{"open":"09:00","close":"17:00"},"wednesday":{"open":"09:00","close":"17:00"},"thursday":{"open":"09:00","close":"17:00"},"friday":{"open":"09:00","close":"17:00"},"saturday":{"open":"09:00","close":"17:00"},"sunday":{"open":"09:00","close":"17:00"}}}"#;

async fn provision(client: &tokio_postgres::Client) -> Ulid {
    client
        .batch_execute(&format!("UPDATE settings SET document = '{SETTINGS}'"))
        .await
        .unwrap();
    let sid = Ulid::new();
    client
        .batch_execute(&format!(
            r#"INSERT INTO services (id, document) VALUES ('{sid}', '{{"id":"{sid}","name":"Bench Dropoff","serviceType":"dropoff","pricingModel":"flat","durationMinutes":60}}')"#
        ))
        .await
        .unwrap();
    sid
}

async fn phase_sequential_creates(client: &tokio_postgres::Client, sid: Ulid, n: usize) {
    let today = Utc::now().date_naive();
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    // One booking per day at 09:00 — no slot contention, pure write-path cost.
    for i in 0..n {
        let id = Ulid::new();
        let date = today + chrono::Duration::days(1 + i as i64);
        let t = Instant::now();
        client
            .batch_execute(&format!(
                r#"INSERT INTO bookings (id, service_id, date, time, name, phone, email, details) VALUES ('{id}', '{sid}', '{date}', '09:00', 'Bench', '555-0100', 'bench@example.com', '{{"dropoff": {{}}}}')"#
            ))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    println!(
        "phase 1: {n} sequential creates in {:.2}s ({:.0} ops/s)",
        elapsed.as_secs_f64(),
        n as f64 / elapsed.as_secs_f64()
    );
    print_latency("create", &mut latencies);
}

async fn phase_slot_queries(client: &tokio_postgres::Client, sid: Ulid, n: usize) {
    let today = Utc::now().date_naive();
    let mut latencies = Vec::with_capacity(n);
    let start = Instant::now();

    for i in 0..n {
        let date = today + chrono::Duration::days(1 + (i % 200) as i64);
        let t = Instant::now();
        client
            .simple_query(&format!(
                "SELECT * FROM slots WHERE service_id = '{sid}' AND date = '{date}'"
            ))
            .await
            .unwrap();
        latencies.push(t.elapsed());
    }

    let elapsed = start.elapsed();
    println!(
        "phase 2: {n} slot queries in {:.2}s ({:.0} ops/s)",
        elapsed.as_secs_f64(),
        n as f64 / elapsed.as_secs_f64()
    );
    print_latency("list_slots", &mut latencies);
}

#[tokio::main]
async fn main() {
    let addr = start_server().await;
    let client = connect(addr).await;
    let sid = provision(&client).await;

    println!("bookd stress run against {addr}");
    phase_sequential_creates(&client, sid, 200).await;
    phase_slot_queries(&client, sid, 500).await;
}
