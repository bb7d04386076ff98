//! Message and service definitions for `proto/athena.proto`.
//!
//! The schema is owned by the classification service; this module mirrors it
//! with `prost` derives and a `tonic` client stub so the crate builds without
//! a `protoc` toolchain. Field tags must stay in lock-step with the `.proto`
//! file.
//!
//! ## Service
//!
//! - `Classify` - bidirectional stream of [`ClassifyRequest`] batches and
//!   [`ClassifyResponse`] results over one long-lived call.
//! - `ClassifySingle` - unary classification of one [`ClassificationInput`].
//! - `ListDeployments` - the deployments currently served.
//!
//! ## Invariants
//!
//! - A [`ClassifyRequest`] with no inputs is a keepalive.
//! - A [`ClassifyResponse`] whose `global_error` carries a non-empty message
//!   is fatal to the stream that produced it.

/// One item to classify.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClassificationInput {
    #[prost(string, tag = "1")]
    pub affiliate: ::prost::alloc::string::String,
    #[prost(string, tag = "2")]
    pub correlation_id: ::prost::alloc::string::String,
    #[prost(enumeration = "RequestEncoding", tag = "3")]
    pub encoding: i32,
    #[prost(bytes = "bytes", tag = "4")]
    pub data: ::prost::bytes::Bytes,
    #[prost(enumeration = "ImageFormat", tag = "5")]
    pub format: i32,
    #[prost(message, repeated, tag = "6")]
    pub hashes: ::prost::alloc::vec::Vec<ImageHash>,
}

/// A hex digest of the item's bytes at some point in its transform chain.
#[derive(Clone, PartialEq, Eq, Hash, ::prost::Message)]
pub struct ImageHash {
    #[prost(string, tag = "1")]
    pub value: ::prost::alloc::string::String,
    #[prost(enumeration = "HashType", tag = "2")]
    pub r#type: i32,
}

/// One wire batch. Empty `inputs` marks a keepalive.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClassifyRequest {
    #[prost(string, tag = "1")]
    pub deployment_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub inputs: ::prost::alloc::vec::Vec<ClassificationInput>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Classification {
    #[prost(string, tag = "1")]
    pub label: ::prost::alloc::string::String,
    #[prost(float, tag = "2")]
    pub weight: f32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClassificationError {
    #[prost(enumeration = "ErrorCode", tag = "1")]
    pub code: i32,
    #[prost(string, tag = "2")]
    pub message: ::prost::alloc::string::String,
    #[prost(string, tag = "3")]
    pub details: ::prost::alloc::string::String,
}

/// Per-item result, matched to its input by `correlation_id`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClassificationOutput {
    #[prost(string, tag = "1")]
    pub correlation_id: ::prost::alloc::string::String,
    #[prost(message, repeated, tag = "2")]
    pub classifications: ::prost::alloc::vec::Vec<Classification>,
    #[prost(message, optional, tag = "3")]
    pub error: ::core::option::Option<ClassificationError>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ClassifyResponse {
    #[prost(message, optional, tag = "1")]
    pub global_error: ::core::option::Option<ClassificationError>,
    #[prost(message, repeated, tag = "2")]
    pub outputs: ::prost::alloc::vec::Vec<ClassificationOutput>,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct Deployment {
    #[prost(string, tag = "1")]
    pub deployment_id: ::prost::alloc::string::String,
    #[prost(int32, tag = "2")]
    pub backlog: i32,
}

#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ListDeploymentsResponse {
    #[prost(message, repeated, tag = "1")]
    pub deployments: ::prost::alloc::vec::Vec<Deployment>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RequestEncoding {
    Unspecified = 0,
    Uncompressed = 1,
    Brotli = 2,
}

impl RequestEncoding {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "REQUEST_ENCODING_UNSPECIFIED",
            Self::Uncompressed => "REQUEST_ENCODING_UNCOMPRESSED",
            Self::Brotli => "REQUEST_ENCODING_BROTLI",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ImageFormat {
    Unspecified = 0,
    Jpeg = 1,
    Png = 2,
    Webp = 3,
    Gif = 4,
    Bmp = 5,
    Tiff = 6,
    RawUint8 = 7,
    RawUint8Bgr = 8,
}

impl ImageFormat {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "IMAGE_FORMAT_UNSPECIFIED",
            Self::Jpeg => "IMAGE_FORMAT_JPEG",
            Self::Png => "IMAGE_FORMAT_PNG",
            Self::Webp => "IMAGE_FORMAT_WEBP",
            Self::Gif => "IMAGE_FORMAT_GIF",
            Self::Bmp => "IMAGE_FORMAT_BMP",
            Self::Tiff => "IMAGE_FORMAT_TIFF",
            Self::RawUint8 => "IMAGE_FORMAT_RAW_UINT8",
            Self::RawUint8Bgr => "IMAGE_FORMAT_RAW_UINT8_BGR",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum HashType {
    Unspecified = 0,
    Md5 = 1,
    Sha256 = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum ErrorCode {
    Unspecified = 0,
    ImageTooLarge = 1,
    ModelError = 2,
    InvalidImage = 3,
    AffiliateNotPermitted = 4,
    DeploymentNotFound = 5,
}

impl ErrorCode {
    pub fn as_str_name(&self) -> &'static str {
        match self {
            Self::Unspecified => "ERROR_CODE_UNSPECIFIED",
            Self::ImageTooLarge => "ERROR_CODE_IMAGE_TOO_LARGE",
            Self::ModelError => "ERROR_CODE_MODEL_ERROR",
            Self::InvalidImage => "ERROR_CODE_INVALID_IMAGE",
            Self::AffiliateNotPermitted => "ERROR_CODE_AFFILIATE_NOT_PERMITTED",
            Self::DeploymentNotFound => "ERROR_CODE_DEPLOYMENT_NOT_FOUND",
        }
    }
}

/// Client stub for `athena.ClassifierService`.
pub mod classifier_service_client {
    use tonic::codegen::http::Uri;
    use tonic::codegen::*;

    #[derive(Debug, Clone)]
    pub struct ClassifierServiceClient<T> {
        inner: tonic::client::Grpc<T>,
    }

    impl ClassifierServiceClient<tonic::transport::Channel> {
        /// Attempt to create a new client by connecting to a given endpoint.
        pub async fn connect<D>(dst: D) -> Result<Self, tonic::transport::Error>
        where
            D: TryInto<tonic::transport::Endpoint>,
            D::Error: Into<StdError>,
        {
            let conn = tonic::transport::Endpoint::new(dst)?.connect().await?;
            Ok(Self::new(conn))
        }
    }

    impl<T> ClassifierServiceClient<T>
    where
        T: tonic::client::GrpcService<tonic::body::Body>,
        T::Error: Into<StdError>,
        T::ResponseBody: Body<Data = Bytes> + std::marker::Send + 'static,
        <T::ResponseBody as Body>::Error: Into<StdError> + std::marker::Send,
    {
        pub fn new(inner: T) -> Self {
            let inner = tonic::client::Grpc::new(inner);
            Self { inner }
        }

        pub fn with_origin(inner: T, origin: Uri) -> Self {
            let inner = tonic::client::Grpc::with_origin(inner, origin);
            Self { inner }
        }

        /// Compress requests with the given encoding.
        #[must_use]
        pub fn send_compressed(mut self, encoding: CompressionEncoding) -> Self {
            self.inner = self.inner.send_compressed(encoding);
            self
        }

        /// Enable decompressing responses.
        #[must_use]
        pub fn accept_compressed(mut self, encoding: CompressionEncoding) -> Self {
            self.inner = self.inner.accept_compressed(encoding);
            self
        }

        /// Limits the maximum size of a decoded message.
        #[must_use]
        pub fn max_decoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_decoding_message_size(limit);
            self
        }

        /// Limits the maximum size of an encoded message.
        #[must_use]
        pub fn max_encoding_message_size(mut self, limit: usize) -> Self {
            self.inner = self.inner.max_encoding_message_size(limit);
            self
        }

        pub async fn classify(
            &mut self,
            request: impl tonic::IntoStreamingRequest<Message = super::ClassifyRequest>,
        ) -> std::result::Result<
            tonic::Response<tonic::codec::Streaming<super::ClassifyResponse>>,
            tonic::Status,
        > {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic_prost::ProstCodec::default();
            let path = http::uri::PathAndQuery::from_static("/athena.ClassifierService/Classify");
            let mut req = request.into_streaming_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("athena.ClassifierService", "Classify"));
            self.inner.streaming(req, path, codec).await
        }

        pub async fn classify_single(
            &mut self,
            request: impl tonic::IntoRequest<super::ClassificationInput>,
        ) -> std::result::Result<tonic::Response<super::ClassificationOutput>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic_prost::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/athena.ClassifierService/ClassifySingle");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("athena.ClassifierService", "ClassifySingle"));
            self.inner.unary(req, path, codec).await
        }

        pub async fn list_deployments(
            &mut self,
            request: impl tonic::IntoRequest<()>,
        ) -> std::result::Result<tonic::Response<super::ListDeploymentsResponse>, tonic::Status>
        {
            self.inner.ready().await.map_err(|e| {
                tonic::Status::unknown(format!("Service was not ready: {}", e.into()))
            })?;
            let codec = tonic_prost::ProstCodec::default();
            let path =
                http::uri::PathAndQuery::from_static("/athena.ClassifierService/ListDeployments");
            let mut req = request.into_request();
            req.extensions_mut()
                .insert(GrpcMethod::new("athena.ClassifierService", "ListDeployments"));
            self.inner.unary(req, path, codec).await
        }
    }
}
