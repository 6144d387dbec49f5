use std::time::Duration;
use timberline::{Queue, Timberline};
use tokio::time::sleep;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let timberline = Timberline::in_memory();
    let queue = timberline
        .queue("work")
        .await?
        .with_read_timeout(Duration::from_secs(1));

    let producer = timberline.queue("work").await?;
    tokio::spawn(async move {
        for i in 1..=6 {
            let body = if i == 4 {
                format!("job #{} with an error", i)
            } else {
                format!("job #{}", i)
            };
            if let Err(e) = producer.push(body).await {
                println!("Failed to enqueue: {}", e);
            }
            if i == 3 {
                println!("Pausing the queue for a moment...");
                if let Err(e) = producer.pause().await {
                    println!("Failed to pause: {}", e);
                }
                sleep(Duration::from_secs(2)).await;
                if let Err(e) = producer.unpause().await {
                    println!("Failed to unpause: {}", e);
                }
            }
            sleep(Duration::from_millis(200)).await;
        }
    });

    println!("Starting worker, waiting for jobs...");
    run_worker(&queue).await?;

    timberline.close();
    Ok(())
}

async fn run_worker(queue: &Queue) -> Result<(), timberline::TimberlineError> {
    let mut idle_polls = 0;

    while idle_polls < 3 {
        if queue.is_paused().await? {
            println!("Queue is paused, waiting...");
            sleep(Duration::from_millis(500)).await;
            continue;
        }

        match queue.pop().await {
            Ok(Some(envelope)) => {
                idle_polls = 0;
                let body = envelope.contents.as_str().unwrap_or_default().to_string();
                match process(&body).await {
                    Ok(()) => println!("✅ Processed {}", body),
                    Err(e) => println!("❌ Failed {} ({}): {}", body, envelope["job_id"], e),
                }
            }
            Ok(None) => {
                idle_polls += 1;
                println!("No jobs within the read timeout");
            }
            Err(e) if e.is_decode() => println!("Skipping undecodable item: {}", e),
            Err(e) => return Err(e),
        }
    }

    println!("Queue has been idle for a while, stopping.");
    Ok(())
}

async fn process(body: &str) -> Result<(), String> {
    sleep(Duration::from_millis(100)).await;

    if body.contains("error") {
        Err("job contains 'error'".to_string())
    } else {
        Ok(())
    }
}
