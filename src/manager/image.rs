use super::{respond, KubeHyperManager};
use crate::convert::image::{
    filter_images, find_image, hyper_auth_config, kube_image, RepositoryReference,
};
use crate::error::{self, Error};
use crate::proto::kubeapi::image_service_server::ImageService;
use crate::proto::kubeapi::*;
use tonic::{Request, Response, Status};
use tracing::debug;

/// The image reference a request names.
fn image_ref(spec: &Option<ImageSpec>) -> error::Result<&str> {
    spec.as_ref()
        .and_then(|s| s.image.as_deref())
        .ok_or(Error::MissingField("image"))
}

#[tonic::async_trait]
impl ImageService for KubeHyperManager {
    /// Lists images, leaving out those that match the request filter.
    async fn list_images(
        &self,
        request: Request<ListImagesRequest>,
    ) -> Result<Response<ListImagesResponse>, Status> {
        let req = request.into_inner();
        debug!("ListImages with request {:?}", req);

        let filter = req
            .filter
            .and_then(|f| f.image)
            .and_then(|spec| spec.image);

        let result = self.client.image_list().await.map(|images| ListImagesResponse {
            images: filter_images(images, filter.as_deref())
                .iter()
                .map(kube_image)
                .collect(),
        });
        respond("ListImages", result)
    }

    async fn image_status(
        &self,
        request: Request<ImageStatusRequest>,
    ) -> Result<Response<ImageStatusResponse>, Status> {
        let req = request.into_inner();
        debug!("ImageStatus with request {:?}", req);

        let result: error::Result<_> = async {
            let image = image_ref(&req.image)?;
            let images = self.client.image_list().await?;
            Ok(ImageStatusResponse {
                image: find_image(&images, image).map(kube_image),
            })
        }
        .await;
        respond("ImageStatus", result)
    }

    async fn pull_image(
        &self,
        request: Request<PullImageRequest>,
    ) -> Result<Response<PullImageResponse>, Status> {
        let req = request.into_inner();
        debug!("PullImage with request {:?}", req);

        let result: error::Result<_> = async {
            let image = image_ref(&req.image)?;
            let reference = RepositoryReference::parse(image);
            let auth = hyper_auth_config(req.auth.as_ref());
            self.client
                .pull_image(&reference.repository, reference.pull_tag(), auth, None)
                .await?;
            Ok(PullImageResponse {})
        }
        .await;
        respond("PullImage", result)
    }

    async fn remove_image(
        &self,
        request: Request<RemoveImageRequest>,
    ) -> Result<Response<RemoveImageResponse>, Status> {
        let req = request.into_inner();
        debug!("RemoveImage with request {:?}", req);

        let result: error::Result<_> = async {
            let image = image_ref(&req.image)?;
            self.client.remove_image(image).await?;
            Ok(RemoveImageResponse {})
        }
        .await;
        respond("RemoveImage", result)
    }
}
