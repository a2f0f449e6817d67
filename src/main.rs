use certpush::{Certbot, Handler, InputSource, ProvisioningRequest, S3Connector};
use lambda_runtime::{run, service_fn, Error, LambdaEvent};
use serde_json::Value;
use std::{env, sync::Arc};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_current_span(false)
        .with_target(false)
        .without_time()
        .init();

    let source = match env::var("INPUT_SOURCE") {
        Ok(source) => source.parse()?,
        Err(_) => InputSource::default(),
    };

    let certbot = env::var("CERTBOT_BIN").unwrap_or_else(|_| "certbot".to_owned());
    let mut builder = Handler::builder()
        .issuer(Box::new(Certbot::new(certbot)))
        .connector(Box::new(S3Connector));
    if let Ok(work_dir) = env::var("WORK_DIR") {
        builder = builder.work_dir(work_dir);
    }
    let handler = Arc::new(builder.build());

    run(service_fn(move |event: LambdaEvent<Value>| {
        let handler = handler.clone();
        async move {
            let request = ProvisioningRequest::resolve(source, event.payload)?;
            let message = handler.handle(&request).await?;
            Ok::<_, Error>(message.to_owned())
        }
    }))
    .await
}
