use chrono::Duration;
use request_cache::{CacheConfig, RequestCache};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug)]
struct Customer {
    name: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let cache: RequestCache<Arc<Customer>, String> =
        RequestCache::new(CacheConfig::new(Duration::seconds(30)));
    let calls = Arc::new(AtomicUsize::new(0));

    let load_customer = |calls: Arc<AtomicUsize>| {
        move || async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            Ok::<_, String>(Arc::new(Customer {
                name: "Alice".to_string(),
            }))
        }
    };

    // Five concurrent readers, one backend call
    let mut handles = vec![];
    for _ in 0..5 {
        let cache = cache.clone();
        let fetch = load_customer(calls.clone());
        handles.push(tokio::spawn(async move {
            cache.fetch_with_cache("customer_42", fetch).await
        }));
    }
    for handle in handles {
        let customer = handle.await??;
        println!("Loaded {}", customer.name);
    }
    println!("Backend calls after concurrent load: {}", calls.load(Ordering::SeqCst));

    let start = std::time::Instant::now();
    cache
        .fetch_with_cache("customer_42", load_customer(calls.clone()))
        .await?;
    println!("Cached read took: {:?}", start.elapsed());

    cache.invalidate("customer_42");
    cache
        .fetch_with_cache("customer_42", load_customer(calls.clone()))
        .await?;
    println!("Backend calls after invalidation: {}", calls.load(Ordering::SeqCst));

    println!("Cache stats: {:?}", cache.stats());

    Ok(())
}
