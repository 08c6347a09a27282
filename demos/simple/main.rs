use ffclient::{ClientConfig, Context};

#[tokio::main]
pub async fn main() {
    env_logger::init();

    let config_url = std::env::var("FF_CONFIG_URL").unwrap();
    let context = Context::new()
        .with_user_id("test-user")
        .with_config_url(config_url)
        .with_attribute("Platform", vec!["iOS"]);
    let client = ClientConfig::new(context).to_client().unwrap();

    // Fetches configuration on first use. Until it is available, all flags are disabled.
    let result = client.query_feature_flag("feature-A").await;
    println!("{}: {:?}", result.feature_name, result.enabled);

    for result in client.query_all_feature_flags().await.unwrap_or_default() {
        println!("{} ({:?}): {}", result.feature_name, result.user_id_type, result.enabled);
    }
}
