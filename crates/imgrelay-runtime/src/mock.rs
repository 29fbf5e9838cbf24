use crate::backend::ContainerRuntime;
use crate::RuntimeError;
use imgrelay_schema::{ImageRef, TransferCredential};
use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

type PullSource = Box<dyn Fn(&ImageRef) -> bool + Send + Sync>;
type PushSink = Box<dyn Fn(&ImageRef) -> Result<(), String> + Send + Sync>;

/// One call made against a [`MockRuntime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuntimeOp {
    Pull(ImageRef),
    Tag { source: ImageRef, target: ImageRef },
    Push(ImageRef),
    Remove(ImageRef),
}

#[derive(Default)]
struct MockState {
    local: BTreeSet<ImageRef>,
    ops: Vec<RuntimeOp>,
    fail_pull: Vec<String>,
    fail_push: Vec<String>,
    fail_remove: bool,
}

/// In-memory local image store.
///
/// Pulls and pushes check that the credential was issued for the image's
/// registry host. Optional hooks connect the mock to a fake registry: the
/// pull source decides which images exist upstream and the push sink
/// receives every successful push.
#[derive(Default)]
pub struct MockRuntime {
    state: Mutex<MockState>,
    pull_source: Option<PullSource>,
    push_sink: Option<PushSink>,
}

impl MockRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_pull_source(
        mut self,
        source: impl Fn(&ImageRef) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.pull_source = Some(Box::new(source));
        self
    }

    #[must_use]
    pub fn with_push_sink(
        mut self,
        sink: impl Fn(&ImageRef) -> Result<(), String> + Send + Sync + 'static,
    ) -> Self {
        self.push_sink = Some(Box::new(sink));
        self
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pretend `image` is already in the local store.
    pub fn mark_local(&self, image: &ImageRef) {
        self.state().local.insert(image.clone());
    }

    /// Fail every pull whose reference contains `needle`.
    pub fn fail_pull(&self, needle: &str) {
        self.state().fail_pull.push(needle.to_owned());
    }

    /// Fail every push whose reference contains `needle`.
    pub fn fail_push(&self, needle: &str) {
        self.state().fail_push.push(needle.to_owned());
    }

    pub fn fail_remove(&self) {
        self.state().fail_remove = true;
    }

    pub fn local_images(&self) -> Vec<ImageRef> {
        self.state().local.iter().cloned().collect()
    }

    pub fn is_local(&self, image: &ImageRef) -> bool {
        self.state().local.contains(image)
    }

    pub fn ops(&self) -> Vec<RuntimeOp> {
        self.state().ops.clone()
    }

    pub fn pulls(&self) -> Vec<ImageRef> {
        self.state()
            .ops
            .iter()
            .filter_map(|op| match op {
                RuntimeOp::Pull(image) => Some(image.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn pushes(&self) -> Vec<ImageRef> {
        self.state()
            .ops
            .iter()
            .filter_map(|op| match op {
                RuntimeOp::Push(image) => Some(image.clone()),
                _ => None,
            })
            .collect()
    }
}

fn check_credential(
    operation: &'static str,
    image: &ImageRef,
    credential: &TransferCredential,
) -> Result<(), RuntimeError> {
    if credential.registry == image.registry_host() {
        Ok(())
    } else {
        Err(RuntimeError::transfer(
            operation,
            image,
            format!("no basic auth credentials for {}", image.registry_host()),
        ))
    }
}

fn matches_any(needles: &[String], image: &ImageRef) -> bool {
    let reference = image.to_string();
    needles.iter().any(|n| reference.contains(n.as_str()))
}

impl ContainerRuntime for MockRuntime {
    fn name(&self) -> &str {
        "mock"
    }

    fn available(&self) -> bool {
        true
    }

    fn pull(&self, image: &ImageRef, credential: &TransferCredential) -> Result<(), RuntimeError> {
        let mut state = self.state();
        state.ops.push(RuntimeOp::Pull(image.clone()));
        check_credential("pull", image, credential)?;
        if matches_any(&state.fail_pull, image) {
            return Err(RuntimeError::transfer("pull", image, "injected failure"));
        }
        if let Some(source) = &self.pull_source {
            if !source(image) {
                return Err(RuntimeError::transfer("pull", image, "manifest unknown"));
            }
        }
        state.local.insert(image.clone());
        Ok(())
    }

    fn tag(&self, source: &ImageRef, target: &ImageRef) -> Result<(), RuntimeError> {
        let mut state = self.state();
        state.ops.push(RuntimeOp::Tag {
            source: source.clone(),
            target: target.clone(),
        });
        if !state.local.contains(source) {
            return Err(RuntimeError::transfer(
                "tag",
                source,
                "No such image in local store",
            ));
        }
        state.local.insert(target.clone());
        Ok(())
    }

    fn push(&self, image: &ImageRef, credential: &TransferCredential) -> Result<(), RuntimeError> {
        let mut state = self.state();
        state.ops.push(RuntimeOp::Push(image.clone()));
        check_credential("push", image, credential)?;
        if !state.local.contains(image) {
            return Err(RuntimeError::transfer(
                "push",
                image,
                "An image does not exist locally with the tag",
            ));
        }
        if matches_any(&state.fail_push, image) {
            return Err(RuntimeError::transfer("push", image, "injected failure"));
        }
        if let Some(sink) = &self.push_sink {
            sink(image).map_err(|e| RuntimeError::transfer("push", image, e))?;
        }
        Ok(())
    }

    fn remove_local_tag(&self, image: &ImageRef) -> Result<(), RuntimeError> {
        let mut state = self.state();
        state.ops.push(RuntimeOp::Remove(image.clone()));
        if state.fail_remove {
            return Err(RuntimeError::transfer("untag", image, "injected failure"));
        }
        if !state.local.remove(image) {
            return Err(RuntimeError::transfer("untag", image, "No such image"));
        }
        Ok(())
    }
}
