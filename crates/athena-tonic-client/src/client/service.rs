//! High-level client for the classification service.
//!
//! [`AthenaClient`] ties the pieces together: it turns [`ImageData`] into
//! wire items, picks a batcher, and hands it to a [`StreamDriver`]. Unary
//! calls go straight to the transport.

use crate::client::{
    auth::{AuthService, StaticToken, TokenCache, TokenProvider},
    batch::{SimpleBatcher, WorkerPoolBatcher},
    channel::connect_lazy,
    config::ClientOptions,
    image::{CorrelationProvider, ImageData},
    streaming::{ClassifyTransport, StreamDriver},
};
use athena_tonic_core::{
    BoxError, ClassificationItem, Error, Result,
    proto::{
        ClassificationOutput, ClassifyResponse, ListDeploymentsResponse, RequestEncoding,
        classifier_service_client::ClassifierServiceClient,
    },
};
use futures::{Stream, StreamExt};
use std::sync::Arc;
use tokio_stream::wrappers::ReceiverStream;
use tonic::{Code, Status, codec::CompressionEncoding, transport::Channel};

/// Generated client over a lazily connected, authenticated channel.
pub type AuthenticatedClient<P> = ClassifierServiceClient<AuthService<Channel, P>>;

/// Responses of one persistent classification stream. A failure, if any, is
/// the last item.
pub type ClassifyStream = ReceiverStream<Result<ClassifyResponse>>;

/// Stamps affiliate, encoding and correlation id onto images.
#[derive(Clone)]
struct InputBuilder {
    affiliate: String,
    encoding: RequestEncoding,
    correlation: Arc<dyn CorrelationProvider>,
}

impl InputBuilder {
    fn build(&self, image: ImageData, correlation_id: Option<String>) -> ClassificationItem {
        let correlation_id =
            correlation_id.unwrap_or_else(|| self.correlation.correlation_id(image.data()));
        image.into_input(self.affiliate.as_str(), correlation_id, self.encoding)
    }
}

/// Client for `athena.ClassifierService`.
#[derive(Clone)]
pub struct AthenaClient<T> {
    options: ClientOptions,
    driver: StreamDriver<T>,
    inputs: InputBuilder,
    token_cache: Option<TokenCache>,
}

impl AthenaClient<AuthenticatedClient<TokenCache>> {
    /// Connects lazily, authenticating every call through `token_cache`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHost`] or [`Error::InvalidConfig`] for bad
    /// options.
    pub fn connect(options: ClientOptions, token_cache: TokenCache) -> Result<Self> {
        let transport = authenticated_client(&options, token_cache.clone())?;
        Ok(Self::new(transport, options)?.with_token_cache(token_cache))
    }
}

impl AthenaClient<AuthenticatedClient<StaticToken>> {
    /// Connects lazily with a pre-issued token.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// See [`AthenaClient::connect`].
    pub fn connect_with_token(options: ClientOptions, token: StaticToken) -> Result<Self> {
        let transport = authenticated_client(&options, token)?;
        Self::new(transport, options)
    }
}

fn authenticated_client<P: TokenProvider>(
    options: &ClientOptions,
    provider: P,
) -> Result<AuthenticatedClient<P>> {
    let channel_options = options.channel_options();
    let service = connect_lazy(&channel_options, provider)?;
    let mut client = ClassifierServiceClient::new(service)
        .max_decoding_message_size(channel_options.max_decoding_message_size);

    if let Some(encoding) = Option::<CompressionEncoding>::from(options.compression) {
        client = client.send_compressed(encoding).accept_compressed(encoding);
    }
    Ok(client)
}

impl<T: ClassifyTransport> AthenaClient<T> {
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] if `options` fail validation.
    pub fn new(transport: T, options: ClientOptions) -> Result<Self> {
        options.validate()?;
        let inputs = InputBuilder {
            affiliate: options.affiliate.clone(),
            encoding: options.request_encoding,
            correlation: options.correlation.provider(),
        };
        Ok(Self {
            options,
            driver: StreamDriver::new(transport),
            inputs,
            token_cache: None,
        })
    }

    /// Invalidates `cache` whenever the service rejects the credential.
    #[must_use]
    pub fn with_token_cache(mut self, cache: TokenCache) -> Self {
        self.driver = self.driver.with_token_cache(cache.clone());
        self.token_cache = Some(cache);
        self
    }

    /// Replaces the correlation strategy chosen in the options.
    #[must_use]
    pub fn with_correlation_provider(mut self, provider: Arc<dyn CorrelationProvider>) -> Self {
        self.inputs.correlation = provider;
        self
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Classifies a stream of images over one persistent stream.
    ///
    /// Each image gets a correlation id from the configured provider.
    /// Responses arrive as the service produces them; the stream ends
    /// cleanly once the idle timeout passes while images are still flowing,
    /// or when the service closes it. Dropping the returned stream stops the
    /// pipeline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for invalid batch limits.
    pub fn classify_images<S>(&self, images: S) -> Result<ClassifyStream>
    where
        S: Stream<Item = ImageData> + Send + 'static,
    {
        let inputs = self.inputs.clone();
        let items = images.map(move |image| inputs.build(image, None));
        let batcher = SimpleBatcher::new(items, self.options.batch_config())?;
        Ok(self.driver.classify(batcher, self.options.idle_timeout))
    }

    /// Classifies raw items that need an expensive transform first.
    ///
    /// `transform` runs on `num_workers` concurrent workers. Completion order
    /// is not preserved across workers. A transform failure ends the stream
    /// with [`Error::Transform`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidConfig`] for invalid batch limits or a zero
    /// worker count.
    pub fn classify_with_workers<S, R, F, Fut, E>(
        &self,
        source: S,
        transform: F,
    ) -> Result<ClassifyStream>
    where
        S: Stream<Item = R> + Send + 'static,
        R: Send + 'static,
        F: Fn(R) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = core::result::Result<ImageData, E>> + Send + 'static,
        E: Into<BoxError> + Send + 'static,
    {
        let inputs = self.inputs.clone();
        let transform = move |raw: R| {
            let image = transform(raw);
            let inputs = inputs.clone();
            async move { image.await.map(|image| inputs.build(image, None)) }
        };

        let batcher = WorkerPoolBatcher::new(
            source,
            transform,
            self.options.batch_config(),
            self.options.num_workers,
        )?;
        Ok(self.driver.classify(batcher, self.options.idle_timeout))
    }

    /// Classifies one image with a unary call.
    ///
    /// The idle timeout, if set, is the call deadline.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Classification`] if the output carries an error,
    /// [`Error::OAuth`] if no token could be obtained, and [`Error::Rpc`] for
    /// any other failed call.
    pub async fn classify_single(
        &self,
        image: ImageData,
        correlation_id: Option<String>,
    ) -> Result<ClassificationOutput> {
        let input = self.inputs.build(image, correlation_id);
        tracing::debug!("Classifying single image {}", input.correlation_id);

        let mut transport = self.driver.transport().clone();
        let output = transport
            .classify_one(input, self.options.idle_timeout)
            .await
            .map_err(|status| self.call_error(status))?;

        if let Some(error) = output.error.as_ref().filter(|e| !e.message.is_empty()) {
            return Err(Error::Classification {
                code: error.code,
                message: error.message.clone(),
                details: error.details.clone(),
            });
        }
        Ok(output)
    }

    /// Lists the deployments the service currently serves.
    ///
    /// # Errors
    ///
    /// Same as [`AthenaClient::classify_single`], minus output errors.
    pub async fn list_deployments(&self) -> Result<ListDeploymentsResponse> {
        let mut transport = self.driver.transport().clone();
        let response = transport
            .deployments()
            .await
            .map_err(|status| self.call_error(status))?;

        if response.deployments.is_empty() {
            tracing::error!("No deployments available");
        }
        Ok(response)
    }

    fn call_error(&self, status: Status) -> Error {
        if status.code() == Code::Unauthenticated {
            if let Some(cache) = &self.token_cache {
                cache.invalidate();
            }
        }
        match Error::oauth_from_status(&status) {
            Some(oauth) => Error::OAuth(oauth),
            None => Error::Rpc(status),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{auth::TokenSnapshot, config::CorrelationStrategy};
    use athena_tonic_core::{
        OAuthError,
        proto::{ClassificationError, ClassifyRequest, Deployment, ErrorCode, ImageFormat},
    };
    use bytes::Bytes;
    use core::time::Duration;
    use futures::stream;
    use parking_lot::Mutex;
    use std::{collections::HashSet, time::SystemTime};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\nimage";

    /// Answers every non-empty request with one output per input.
    #[derive(Clone, Default)]
    struct EchoTransport {
        unary: Arc<Mutex<Vec<(ClassificationItem, Option<Duration>)>>>,
        unary_error: Option<ClassificationError>,
        unary_status: Option<Status>,
        deployments: Vec<Deployment>,
    }

    fn echo_output(input: &ClassificationItem) -> ClassificationOutput {
        ClassificationOutput {
            correlation_id: input.correlation_id.clone(),
            classifications: Vec::new(),
            error: None,
        }
    }

    #[tonic::async_trait]
    impl ClassifyTransport for EchoTransport {
        async fn open(
            &mut self,
            requests: ReceiverStream<ClassifyRequest>,
        ) -> core::result::Result<crate::client::streaming::ResponseStream, Status> {
            let responses = requests
                .filter(|r| futures::future::ready(!r.inputs.is_empty()))
                .map(|r| {
                    Ok::<_, Status>(ClassifyResponse {
                        global_error: None,
                        outputs: r.inputs.iter().map(echo_output).collect(),
                    })
                });
            Ok(responses.boxed())
        }

        async fn classify_one(
            &mut self,
            input: ClassificationItem,
            deadline: Option<Duration>,
        ) -> core::result::Result<ClassificationOutput, Status> {
            if let Some(status) = self.unary_status.clone() {
                return Err(status);
            }
            let mut output = echo_output(&input);
            output.error = self.unary_error.clone();
            self.unary.lock().push((input, deadline));
            Ok(output)
        }

        async fn deployments(&mut self) -> core::result::Result<ListDeploymentsResponse, Status> {
            Ok(ListDeploymentsResponse {
                deployments: self.deployments.clone(),
            })
        }
    }

    fn options() -> ClientOptions {
        ClientOptions {
            affiliate: "affiliate-1".to_string(),
            deployment_id: "dep".to_string(),
            ..ClientOptions::default()
        }
    }

    fn image(n: u8) -> ImageData {
        ImageData::new(vec![0x89, b'P', b'N', b'G', n])
    }

    async fn collect_ids(stream: &mut ClassifyStream, count: usize) -> Vec<String> {
        let mut ids = Vec::new();
        while ids.len() < count {
            let response = stream.next().await.unwrap().unwrap();
            ids.extend(response.outputs.into_iter().map(|o| o.correlation_id));
        }
        ids
    }

    #[tokio::test(start_paused = true)]
    async fn classify_images_uses_hash_correlation_ids() {
        let client = AthenaClient::new(EchoTransport::default(), options()).unwrap();
        let images: Vec<_> = (0..5).map(image).collect();
        let expected: Vec<_> = images
            .iter()
            .map(|i| i.sha256_hashes()[0].clone())
            .collect();

        let mut responses = client.classify_images(stream::iter(images)).unwrap();
        let ids = collect_ids(&mut responses, 5).await;
        assert_eq!(ids, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn classify_with_workers_transforms_every_item() {
        let options = ClientOptions {
            num_workers: 3,
            correlation: CorrelationStrategy::Uuid,
            ..options()
        };
        let client = AthenaClient::new(EchoTransport::default(), options).unwrap();

        let raw = stream::iter(0..9u8);
        let mut responses = client
            .classify_with_workers(raw, |n| async move {
                Ok::<_, BoxError>(image(n))
            })
            .unwrap();

        let ids = collect_ids(&mut responses, 9).await;
        let unique: HashSet<_> = ids.iter().collect();
        assert_eq!(unique.len(), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn classify_with_workers_reports_transform_failure() {
        let client = AthenaClient::new(EchoTransport::default(), options()).unwrap();
        let mut responses = client
            .classify_with_workers(stream::iter([1u8]), |_| async move {
                Err::<ImageData, _>("corrupt image")
            })
            .unwrap();

        let err = responses.next().await.unwrap().unwrap_err();
        assert!(matches!(err, Error::Transform(_)));
        assert!(responses.next().await.is_none());
    }

    #[tokio::test]
    async fn classify_single_builds_input_and_applies_deadline() {
        let transport = EchoTransport::default();
        let client = AthenaClient::new(transport.clone(), options()).unwrap();

        let output = client
            .classify_single(ImageData::new(Bytes::from_static(PNG)), Some("corr-1".into()))
            .await
            .unwrap();
        assert_eq!(output.correlation_id, "corr-1");

        let calls = transport.unary.lock().clone();
        assert_eq!(calls.len(), 1);
        let (input, deadline) = &calls[0];
        assert_eq!(input.affiliate, "affiliate-1");
        assert_eq!(input.format, ImageFormat::Png as i32);
        assert_eq!(input.encoding, RequestEncoding::Uncompressed as i32);
        assert_eq!(*deadline, Some(Duration::from_secs(120)));
    }

    #[tokio::test]
    async fn classify_single_maps_output_error() {
        let transport = EchoTransport {
            unary_error: Some(ClassificationError {
                code: ErrorCode::InvalidImage as i32,
                message: "Invalid image".to_string(),
                details: String::new(),
            }),
            ..Default::default()
        };
        let client = AthenaClient::new(transport, options()).unwrap();

        let err = client.classify_single(image(1), None).await.unwrap_err();
        match err {
            Error::Classification { code, message, .. } => {
                assert_eq!(code, ErrorCode::InvalidImage as i32);
                assert_eq!(message, "Invalid image");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unauthenticated_unary_call_invalidates_cache() {
        let cache = TokenCache::new("client-id", "client-secret").unwrap();
        cache.seed(TokenSnapshot::new(
            "abcd123",
            "Bearer",
            SystemTime::now(),
            Duration::from_secs(3600),
        ));
        let transport = EchoTransport {
            unary_status: Some(Status::unauthenticated("token expired")),
            ..Default::default()
        };
        let client = AthenaClient::new(transport, options())
            .unwrap()
            .with_token_cache(cache.clone());

        let err = client.classify_single(image(1), None).await.unwrap_err();
        assert!(matches!(err, Error::Rpc(ref s) if s.code() == Code::Unauthenticated));
        assert!(cache.current().is_none());
    }

    #[tokio::test]
    async fn token_failure_is_recovered_from_status() {
        let status: Status = Error::OAuth(OAuthError::Network("refused".to_string())).into();
        let transport = EchoTransport {
            unary_status: Some(status),
            ..Default::default()
        };
        let client = AthenaClient::new(transport, options()).unwrap();

        let err = client.classify_single(image(1), None).await.unwrap_err();
        assert!(matches!(err, Error::OAuth(OAuthError::Network(_))));
    }

    #[tokio::test]
    async fn list_deployments_returns_service_answer() {
        let transport = EchoTransport {
            deployments: vec![Deployment {
                deployment_id: "dep".to_string(),
                backlog: 3,
            }],
            ..Default::default()
        };
        let client = AthenaClient::new(transport, options()).unwrap();
        let response = client.list_deployments().await.unwrap();
        assert_eq!(response.deployments.len(), 1);

        let empty = AthenaClient::new(EchoTransport::default(), options()).unwrap();
        assert!(empty.list_deployments().await.unwrap().deployments.is_empty());
    }

    #[test]
    fn invalid_options_are_rejected() {
        let options = ClientOptions {
            max_batch_size: 0,
            ..options()
        };
        assert!(matches!(
            AthenaClient::new(EchoTransport::default(), options),
            Err(Error::InvalidConfig { .. })
        ));
    }
}
