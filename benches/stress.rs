use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Datelike, Duration as Days, NaiveDate, NaiveTime, Utc, Weekday};
use ulid::Ulid;

use quitbook::{CoachProfile, Config, Engine, EngineError, InMemoryDirectory, UserProfile};

const COACHES: usize = 10;
const BOOKING_DAYS: i64 = 30;
const RACERS: usize = 64;

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

fn bench_data_dir() -> PathBuf {
    let dir = std::env::temp_dir().join(format!("quitbook_bench_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

fn t(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

async fn setup(engine: &Engine, directory: &InMemoryDirectory) -> (Vec<Ulid>, Ulid) {
    let weekdays = [
        Weekday::Mon,
        Weekday::Tue,
        Weekday::Wed,
        Weekday::Thu,
        Weekday::Fri,
        Weekday::Sat,
        Weekday::Sun,
    ];

    let mut coaches = Vec::new();
    for i in 0..COACHES {
        let id = Ulid::new();
        directory.insert_coach(CoachProfile {
            id,
            display_name: format!("Coach {i}"),
            avatar_url: None,
        });
        for weekday in weekdays {
            engine.add_slot(id, weekday, t(8, 0), t(20, 0)).await.unwrap();
        }
        coaches.push(id);
    }

    let user = Ulid::new();
    directory.insert_user(UserProfile {
        id: user,
        display_name: "Bench User".into(),
    });

    println!("  created {COACHES} coaches with daily 08:00-20:00 windows");
    (coaches, user)
}

/// Sequential bookings across coaches and days: the uncontended write path.
async fn bench_sequential_creates(engine: &Engine, coaches: &[Ulid], user: Ulid) {
    let start_date = Utc::now().date_naive() + Days::days(2);
    let mut latencies = Vec::new();

    for day in 0..BOOKING_DAYS {
        let date: NaiveDate = start_date + Days::days(day);
        for &coach in coaches {
            // Four 30-minute morning sessions per coach per day.
            for session in 0..4u32 {
                let start = t(9 + session / 2, (session % 2) * 30);
                let began = Instant::now();
                engine
                    .create_appointment(coach, user, date, start, 30, None)
                    .await
                    .unwrap();
                latencies.push(began.elapsed());
            }
        }
    }

    print_latency("create_appointment (uncontended)", &mut latencies);
}

/// All tasks race for one coach's single free hour: the contended path.
async fn bench_contended_creates(engine: &Arc<Engine>, coach: Ulid, directory: &InMemoryDirectory) {
    let mut date = Utc::now().date_naive() + Days::days(1);
    while date.weekday() != Weekday::Mon {
        date += Days::days(1);
    }

    let mut handles = Vec::new();
    for i in 0..RACERS {
        let user = Ulid::new();
        directory.insert_user(UserProfile {
            id: user,
            display_name: format!("Racer {i}"),
        });
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let began = Instant::now();
            let result = engine
                .create_appointment(coach, user, date, t(15, 0), 60, None)
                .await;
            (began.elapsed(), result)
        }));
    }

    let mut latencies = Vec::new();
    let mut winners = 0usize;
    let mut conflicts = 0usize;
    for handle in handles {
        let (elapsed, result) = handle.await.unwrap();
        latencies.push(elapsed);
        match result {
            Ok(_) => winners += 1,
            Err(EngineError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error under contention: {e}"),
        }
    }

    assert_eq!(winners, 1, "exactly one racer may win the slot");
    println!("  contended slot: {winners} winner, {conflicts} conflicts out of {RACERS} racers");
    print_latency("create_appointment (contended)", &mut latencies);
}

/// Read path: availability rendering over a fully booked schedule.
async fn bench_free_windows(engine: &Engine, coaches: &[Ulid]) {
    let start_date = Utc::now().date_naive() + Days::days(2);
    let mut latencies = Vec::new();

    for day in 0..BOOKING_DAYS {
        let date: NaiveDate = start_date + Days::days(day);
        for &coach in coaches {
            let began = Instant::now();
            let windows = engine.free_windows_on(coach, date, Some(30)).await;
            latencies.push(began.elapsed());
            assert!(!windows.is_empty());
        }
    }

    print_latency("free_windows (30-minute filter)", &mut latencies);
}

fn main() {
    tracing_subscriber::fmt::init();

    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async {
        let config = Config {
            data_dir: bench_data_dir(),
            compact_threshold: u64::MAX,
            metrics_port: None,
        };
        let directory = Arc::new(InMemoryDirectory::new());
        let engine = Engine::open(&config, directory.clone()).unwrap();

        println!("setup:");
        let (coaches, user) = setup(&engine, &directory).await;

        println!("write path:");
        let began = Instant::now();
        bench_sequential_creates(&engine, &coaches, user).await;
        println!("  total: {:.2}s", began.elapsed().as_secs_f64());

        println!("contention:");
        bench_contended_creates(&engine, coaches[0], &directory).await;

        println!("read path:");
        bench_free_windows(&engine, &coaches).await;

        let _ = std::fs::remove_dir_all(&config.data_dir);
    });
}
