use serde_json::json;
use timberline::{Metadata, Timberline};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let timberline = Timberline::in_memory();
    let queue = timberline.queue("greetings").await?;

    println!("Pushing a message onto {}...", queue.name());
    let mut metadata = Metadata::new();
    metadata.insert("special_notes".to_string(), json!("Super-awesome."));
    let length = queue.push_with_metadata("Hello, Timberline!", metadata).await?;
    println!("Queue length is now {}", length);

    println!("\nPopping it back...");
    if let Some(envelope) = queue.pop().await? {
        println!("Contents: {}", envelope.contents);
        println!("Notes:    {}", envelope["special_notes"]);
        println!("Job id:   {}", envelope["job_id"]);
    }

    println!("\nKnown queues: {:?}", timberline.queue_names().await?);

    queue.delete().await?;
    println!("Deleted {}; known queues: {:?}", queue.name(), timberline.queue_names().await?);

    timberline.close();
    Ok(())
}
