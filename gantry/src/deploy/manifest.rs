//! Deployment and service manifest templating.
//!
//! Templates are plain text with two placeholder tokens. Rendering is the
//! only substitution the orchestrator performs; everything else in the
//! manifest is the operator's business.

use crate::errors::DeployError;

/// The image-reference placeholder token.
pub const IMAGE_PLACEHOLDER: &str = "{{IMAGE}}";
/// The namespace placeholder token.
pub const NAMESPACE_PLACEHOLDER: &str = "{{NAMESPACE}}";

/// A deployment manifest template with a substitutable image reference.
#[derive(Debug, Clone)]
pub struct ManifestTemplate {
    body: String,
}

impl ManifestTemplate {
    /// Wraps a template body.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    /// A minimal deployment descriptor: one container, image and namespace
    /// substituted at render time.
    #[must_use]
    pub fn default_deployment(deployment_name: &str, replicas: u32, container_port: u16) -> Self {
        Self::new(format!(
            "\
apiVersion: apps/v1
kind: Deployment
metadata:
  name: {deployment_name}
  namespace: {NAMESPACE_PLACEHOLDER}
spec:
  replicas: {replicas}
  selector:
    matchLabels:
      app: {deployment_name}
  template:
    metadata:
      labels:
        app: {deployment_name}
    spec:
      containers:
        - name: {deployment_name}
          image: {IMAGE_PLACEHOLDER}
          ports:
            - containerPort: {container_port}
"
        ))
    }

    /// Renders the template with the artifact reference and namespace.
    ///
    /// # Errors
    ///
    /// Returns `DeployError::BadTemplate` if the body has no image
    /// placeholder; applying such a manifest would silently deploy
    /// whatever image the template hard-codes.
    pub fn render(&self, image: &str, namespace: &str) -> Result<String, DeployError> {
        if !self.body.contains(IMAGE_PLACEHOLDER) {
            return Err(DeployError::BadTemplate {
                placeholder: IMAGE_PLACEHOLDER.to_string(),
            });
        }
        Ok(self
            .body
            .replace(IMAGE_PLACEHOLDER, image)
            .replace(NAMESPACE_PLACEHOLDER, namespace))
    }
}

/// Renders a service descriptor exposing a container port on a node port.
#[must_use]
pub fn service_manifest(
    service_name: &str,
    namespace: &str,
    container_port: u16,
    node_port: u16,
) -> String {
    format!(
        "\
apiVersion: v1
kind: Service
metadata:
  name: {service_name}
  namespace: {namespace}
spec:
  type: NodePort
  selector:
    app: {service_name}
  ports:
    - port: {container_port}
      targetPort: {container_port}
      nodePort: {node_port}
"
    )
}
