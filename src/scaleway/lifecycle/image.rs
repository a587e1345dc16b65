//! Boot image resolution for the Scaleway backend.

use crate::backend::InstanceRequest;
use scaleway_rs::{ScalewayImage, ScalewayListInstanceImagesBuilder};

use super::super::{ScalewayBackend, ScalewayBackendError};

impl ScalewayBackend {
    /// Resolves the request's image label to an image id.
    ///
    /// Project images shadow public ones; public images are only listed when
    /// the project has no match.
    pub(in crate::scaleway) async fn resolve_image_id(
        &self,
        request: &InstanceRequest,
    ) -> Result<String, ScalewayBackendError> {
        let mut project_query =
            ScalewayListInstanceImagesBuilder::new(self.api.clone(), &request.zone)
                .public(true)
                .project(&request.project_id)
                .name(&request.image_label)
                .arch(&request.architecture);
        if let Some(org) = &request.organisation_id {
            project_query = project_query.organization(org);
        }
        let project_images = Self::usable_images(project_query.run_async().await?, request);
        if !project_images.is_empty() {
            return Self::newest_image(project_images, request);
        }

        let public_images = ScalewayListInstanceImagesBuilder::new(self.api.clone(), &request.zone)
            .public(true)
            .name(&request.image_label)
            .arch(&request.architecture)
            .run_async()
            .await?;
        Self::newest_image(Self::usable_images(public_images, request), request)
    }

    /// Keeps available images matching the requested architecture.
    pub(in crate::scaleway) fn usable_images(
        images: Vec<ScalewayImage>,
        request: &InstanceRequest,
    ) -> Vec<ScalewayImage> {
        images
            .into_iter()
            .filter(|image| image.arch == request.architecture && image.state == "available")
            .collect()
    }

    /// Picks the most recently created image.
    pub(in crate::scaleway) fn newest_image(
        candidates: Vec<ScalewayImage>,
        request: &InstanceRequest,
    ) -> Result<String, ScalewayBackendError> {
        candidates
            .into_iter()
            .max_by(|lhs, rhs| lhs.creation_date.cmp(&rhs.creation_date))
            .map(|image| image.id)
            .ok_or_else(|| ScalewayBackendError::ImageNotFound {
                label: request.image_label.clone(),
                arch: request.architecture.clone(),
                zone: request.zone.clone(),
            })
    }
}
