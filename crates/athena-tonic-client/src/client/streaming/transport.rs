use athena_tonic_core::proto::{
    ClassificationInput, ClassificationOutput, ClassifyRequest, ClassifyResponse,
    ListDeploymentsResponse, classifier_service_client::ClassifierServiceClient,
};
use core::time::Duration;
use futures::{StreamExt, stream::BoxStream};
use tokio_stream::wrappers::ReceiverStream;
use tonic::{
    Request, Status,
    codegen::{Body, Bytes, StdError},
};

/// Inbound half of the persistent classification stream.
pub type ResponseStream = BoxStream<'static, Result<ClassifyResponse, Status>>;

/// The RPC surface the stream driver and client facade depend on.
///
/// Implemented for the generated [`ClassifierServiceClient`] over any gRPC
/// service, so the plain channel and the auth-wrapped channel both work.
#[tonic::async_trait]
pub trait ClassifyTransport: Clone + Send + Sync + 'static {
    /// Opens the bidirectional `Classify` stream fed by `requests`.
    async fn open(
        &mut self,
        requests: ReceiverStream<ClassifyRequest>,
    ) -> Result<ResponseStream, Status>;

    /// Unary classification of one input, with an optional call deadline.
    async fn classify_one(
        &mut self,
        _input: ClassificationInput,
        _deadline: Option<Duration>,
    ) -> Result<ClassificationOutput, Status> {
        Err(Status::unimplemented("ClassifySingle is not supported by this transport"))
    }

    async fn deployments(&mut self) -> Result<ListDeploymentsResponse, Status> {
        Err(Status::unimplemented("ListDeployments is not supported by this transport"))
    }
}

#[tonic::async_trait]
impl<T> ClassifyTransport for ClassifierServiceClient<T>
where
    T: tonic::client::GrpcService<tonic::body::Body> + Clone + Send + Sync + 'static,
    T::Future: Send,
    T::Error: Into<StdError>,
    T::ResponseBody: Body<Data = Bytes> + Send + 'static,
    <T::ResponseBody as Body>::Error: Into<StdError> + Send,
{
    async fn open(
        &mut self,
        requests: ReceiverStream<ClassifyRequest>,
    ) -> Result<ResponseStream, Status> {
        let response = self.classify(requests).await?;
        Ok(response.into_inner().boxed())
    }

    async fn classify_one(
        &mut self,
        input: ClassificationInput,
        deadline: Option<Duration>,
    ) -> Result<ClassificationOutput, Status> {
        let mut request = Request::new(input);
        if let Some(deadline) = deadline {
            request.set_timeout(deadline);
        }
        Ok(self.classify_single(request).await?.into_inner())
    }

    async fn deployments(&mut self) -> Result<ListDeploymentsResponse, Status> {
        Ok(self.list_deployments(()).await?.into_inner())
    }
}
