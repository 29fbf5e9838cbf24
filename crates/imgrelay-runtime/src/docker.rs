use crate::backend::ContainerRuntime;
use crate::RuntimeError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use imgrelay_schema::{ImageRef, TransferCredential};
use secrecy::ExposeSecret;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

/// Docker CLI backend.
///
/// Every image command runs with `--config <dir>` pointing at a throw-away
/// directory. Its `config.json` holds only the credential for that command
/// plus the user's `currentContext`, and the user's `contexts` store is
/// linked in, so pull, tag, push and removal all talk to the same daemon
/// while the user's own credentials are never read or written.
pub struct DockerCli {
    program: String,
    leading_args: Vec<String>,
    user_config: Option<PathBuf>,
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new()
    }
}

impl DockerCli {
    pub fn new() -> Self {
        Self {
            program: "docker".to_owned(),
            leading_args: Vec::new(),
            user_config: user_config_dir(),
        }
    }

    /// Use another executable, optionally with arguments placed before the
    /// docker arguments (e.g. `sudo docker`).
    pub fn with_command(program: &str, leading_args: &[&str]) -> Self {
        Self {
            program: program.to_owned(),
            leading_args: leading_args.iter().map(|a| (*a).to_owned()).collect(),
            user_config: user_config_dir(),
        }
    }

    /// Take the docker context from `dir` instead of `$DOCKER_CONFIG` or
    /// `~/.docker`. `None` leaves the daemon selection to docker's defaults.
    #[must_use]
    pub fn with_user_config(mut self, dir: Option<PathBuf>) -> Self {
        self.user_config = dir;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    fn command(&self, config_dir: Option<&Path>, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args);
        if let Some(dir) = config_dir {
            cmd.arg("--config").arg(dir);
        }
        cmd.args(args);
        cmd
    }

    fn run(
        &self,
        operation: &'static str,
        image: &ImageRef,
        credential: Option<&TransferCredential>,
        args: &[&str],
    ) -> Result<Output, RuntimeError> {
        let config = write_session_config(credential, self.user_config.as_deref())?;
        tracing::debug!("{} {}", self.program, args.join(" "));
        let output = self.command(Some(config.path()), args).output()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = match stderr.trim() {
                "" => format!("exited with {}", output.status),
                msg => msg.to_owned(),
            };
            return Err(RuntimeError::transfer(operation, image, message));
        }
        Ok(output)
    }
}

/// `$DOCKER_CONFIG`, else `~/.docker`.
fn user_config_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os("DOCKER_CONFIG").filter(|d| !d.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".docker"))
}

/// The `currentContext` of the docker configuration in `dir`, if any.
pub fn current_context(dir: &Path) -> Option<String> {
    let raw = match std::fs::read(dir.join("config.json")) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            tracing::warn!("cannot read {}: {e}", dir.join("config.json").display());
            return None;
        }
    };
    match serde_json::from_slice::<serde_json::Value>(&raw) {
        Ok(value) => value
            .get("currentContext")
            .and_then(serde_json::Value::as_str)
            .filter(|name| !name.is_empty() && *name != "default")
            .map(str::to_owned),
        Err(e) => {
            tracing::warn!("ignoring malformed {}: {e}", dir.join("config.json").display());
            None
        }
    }
}

/// Render a docker `config.json` that authenticates against the credential's
/// registry only and selects `context` when given.
pub fn session_config_json(
    credential: Option<&TransferCredential>,
    context: Option<&str>,
) -> serde_json::Value {
    let mut auths = serde_json::Map::new();
    if let Some(credential) = credential {
        let auth = STANDARD.encode(format!(
            "{}:{}",
            credential.principal,
            credential.secret.expose_secret()
        ));
        auths.insert(
            credential.registry.clone(),
            serde_json::json!({ "auth": auth }),
        );
    }
    let mut config = serde_json::json!({ "auths": auths });
    if let Some(context) = context {
        config["currentContext"] = serde_json::Value::from(context);
    }
    config
}

/// Write a fresh temporary docker config directory for one command. The
/// directory is removed when the returned handle is dropped.
pub fn write_session_config(
    credential: Option<&TransferCredential>,
    user_config: Option<&Path>,
) -> Result<TempDir, RuntimeError> {
    let dir = tempfile::Builder::new().prefix("imgrelay-docker-").tempdir()?;
    let context = user_config.and_then(current_context);
    if let (Some(user_config), Some(_)) = (user_config, &context) {
        link_contexts(&user_config.join("contexts"), &dir.path().join("contexts"))?;
    }
    let body = serde_json::to_vec(&session_config_json(credential, context.as_deref()))
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    std::fs::write(dir.path().join("config.json"), body)?;
    Ok(dir)
}

#[cfg(unix)]
fn link_contexts(store: &Path, link: &Path) -> std::io::Result<()> {
    if store.is_dir() {
        std::os::unix::fs::symlink(store, link)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn link_contexts(store: &Path, link: &Path) -> std::io::Result<()> {
    if store.is_dir() {
        copy_tree(store, link)?;
    }
    Ok(())
}

#[cfg(not(unix))]
fn copy_tree(from: &Path, to: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(to)?;
    for entry in std::fs::read_dir(from)? {
        let entry = entry?;
        let target = to.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_tree(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), target)?;
        }
    }
    Ok(())
}

impl ContainerRuntime for DockerCli {
    fn name(&self) -> &str {
        "docker"
    }

    fn available(&self) -> bool {
        self.command(None, &["--version"])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn pull(&self, image: &ImageRef, credential: &TransferCredential) -> Result<(), RuntimeError> {
        let reference = image.to_string();
        self.run("pull", image, Some(credential), &["pull", &reference])?;
        Ok(())
    }

    fn tag(&self, source: &ImageRef, target: &ImageRef) -> Result<(), RuntimeError> {
        let (source_ref, target_ref) = (source.to_string(), target.to_string());
        self.run("tag", target, None, &["tag", &source_ref, &target_ref])?;
        Ok(())
    }

    fn push(&self, image: &ImageRef, credential: &TransferCredential) -> Result<(), RuntimeError> {
        let reference = image.to_string();
        self.run("push", image, Some(credential), &["push", &reference])?;
        Ok(())
    }

    fn remove_local_tag(&self, image: &ImageRef) -> Result<(), RuntimeError> {
        let reference = image.to_string();
        self.run("untag", image, None, &["image", "rm", &reference])?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn credential() -> TransferCredential {
        TransferCredential {
            principal: "AWS".to_owned(),
            secret: SecretString::from("pa55".to_owned()),
            registry: "123456789012.dkr.ecr.us-east-1.amazonaws.com".to_owned(),
            expires_at: None,
        }
    }

    fn image() -> ImageRef {
        ImageRef::new("123456789012.dkr.ecr.us-east-1.amazonaws.com/app", "v1")
    }

    /// A stand-in docker that appends its arguments, the config file it was
    /// given and whether a context store was linked in, to `log`.
    fn fake_docker(dir: &Path, exit_code: i32) -> (DockerCli, PathBuf) {
        let log = dir.join("calls.log");
        let script = dir.join("docker.sh");
        std::fs::write(
            &script,
            format!(
                r#"echo "$@" >> "{log}"
if [ "$1" = "--config" ]; then
  cat "$2/config.json" >> "{log}"; echo >> "{log}"
  if [ -d "$2/contexts/meta" ]; then echo "contexts linked" >> "{log}"; fi
fi
echo "simulated stderr" >&2
exit {exit_code}
"#,
                log = log.display()
            ),
        )
        .unwrap();
        let script = script.display().to_string();
        let docker = DockerCli::with_command("sh", &[&script]).with_user_config(None);
        (docker, log)
    }

    fn user_config(dir: &Path, context: &str) -> PathBuf {
        let config = dir.join("user-docker");
        std::fs::create_dir_all(config.join("contexts/meta/abc123")).unwrap();
        std::fs::write(
            config.join("config.json"),
            format!(
                r#"{{"currentContext": "{context}", "auths": {{"ghcr.io": {{"auth": "dXNlcjp0b2tlbg=="}}}}}}"#
            ),
        )
        .unwrap();
        config
    }

    #[test]
    fn session_config_scopes_credential_to_registry() {
        let json = session_config_json(Some(&credential()), None);
        let auth = json["auths"]["123456789012.dkr.ecr.us-east-1.amazonaws.com"]["auth"]
            .as_str()
            .unwrap();
        assert_eq!(STANDARD.decode(auth).unwrap(), b"AWS:pa55");
        assert_eq!(json["auths"].as_object().unwrap().len(), 1);
        assert!(json.get("currentContext").is_none());
    }

    #[test]
    fn session_config_without_credential_keeps_context_only() {
        let json = session_config_json(None, Some("remote-builder"));
        assert_eq!(json["currentContext"], "remote-builder");
        assert!(json["auths"].as_object().unwrap().is_empty());
    }

    #[test]
    fn session_config_dir_is_removed_on_drop() {
        let dir = write_session_config(Some(&credential()), None).unwrap();
        let path = dir.path().to_path_buf();
        assert!(path.join("config.json").exists());
        drop(dir);
        assert!(!path.exists());
    }

    #[test]
    fn current_context_reads_user_config() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(current_context(dir.path()), None);

        let config = user_config(dir.path(), "remote-builder");
        assert_eq!(current_context(&config).as_deref(), Some("remote-builder"));

        std::fs::write(config.join("config.json"), r#"{"currentContext": "default"}"#).unwrap();
        assert_eq!(current_context(&config), None);

        std::fs::write(config.join("config.json"), "{not json").unwrap();
        assert_eq!(current_context(&config), None);
    }

    #[test]
    fn command_places_config_before_subcommand() {
        let docker = DockerCli::with_command("sudo", &["docker"]);
        let cmd = docker.command(Some(Path::new("/tmp/auth")), &["pull", "img:v1"]);
        let args: Vec<_> = cmd
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(cmd.get_program(), "sudo");
        assert_eq!(args, ["docker", "--config", "/tmp/auth", "pull", "img:v1"]);
    }

    #[test]
    fn pull_and_push_use_temporary_config() {
        let dir = tempfile::tempdir().unwrap();
        let (docker, log) = fake_docker(dir.path(), 0);
        docker.pull(&image(), &credential()).unwrap();
        docker.push(&image(), &credential()).unwrap();

        let calls = std::fs::read_to_string(log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert!(lines[0].starts_with("--config "));
        assert!(lines[0].ends_with(" pull 123456789012.dkr.ecr.us-east-1.amazonaws.com/app:v1"));
        assert!(lines[1].contains("\"auths\""));
        assert!(lines[2].ends_with(" push 123456789012.dkr.ecr.us-east-1.amazonaws.com/app:v1"));

        let config_dir = lines[0].split(' ').nth(1).unwrap();
        assert!(!Path::new(config_dir).exists());
    }

    #[test]
    fn tag_and_untag_run_without_credentials() {
        let dir = tempfile::tempdir().unwrap();
        let (docker, log) = fake_docker(dir.path(), 0);
        let target = ImageRef::new("123456789012.dkr.ecr.eu-west-1.amazonaws.com/app", "v1");
        docker.tag(&image(), &target).unwrap();
        docker.remove_local_tag(&target).unwrap();

        let calls = std::fs::read_to_string(log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines.len(), 4, "{calls}");
        assert!(lines[0].starts_with("--config "));
        assert!(lines[0].ends_with(
            " tag 123456789012.dkr.ecr.us-east-1.amazonaws.com/app:v1 123456789012.dkr.ecr.eu-west-1.amazonaws.com/app:v1"
        ));
        assert_eq!(lines[1], r#"{"auths":{}}"#);
        assert!(lines[2].starts_with("--config "));
        assert!(lines[2].ends_with(" image rm 123456789012.dkr.ecr.eu-west-1.amazonaws.com/app:v1"));
        assert_eq!(lines[3], r#"{"auths":{}}"#);
    }

    #[test]
    fn every_command_targets_the_users_current_context() {
        let dir = tempfile::tempdir().unwrap();
        let (docker, log) = fake_docker(dir.path(), 0);
        let docker = docker.with_user_config(Some(user_config(dir.path(), "remote-builder")));
        let target = ImageRef::new("123456789012.dkr.ecr.eu-west-1.amazonaws.com/app", "v1");

        docker.pull(&image(), &credential()).unwrap();
        docker.tag(&image(), &target).unwrap();
        docker.push(&target, &credential()).unwrap();
        docker.remove_local_tag(&target).unwrap();

        let calls = std::fs::read_to_string(log).unwrap();
        let lines: Vec<&str> = calls.lines().collect();
        assert_eq!(lines.len(), 12, "{calls}");
        for call in lines.chunks(3) {
            assert!(call[0].starts_with("--config "), "{calls}");
            let config: serde_json::Value = serde_json::from_str(call[1]).unwrap();
            assert_eq!(config["currentContext"], "remote-builder");
            assert!(config["auths"].get("ghcr.io").is_none());
            assert_eq!(call[2], "contexts linked");
        }
    }

    #[test]
    fn failing_command_is_transfer_error_with_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let (docker, _log) = fake_docker(dir.path(), 1);
        let err = docker.pull(&image(), &credential()).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::Transfer { operation: "pull", ref message, .. } if message == "simulated stderr"
        ));
    }

    #[test]
    fn missing_program_is_unavailable() {
        let docker = DockerCli::with_command("/nonexistent/imgrelay-docker", &[]);
        assert!(!docker.available());
        assert!(matches!(
            docker.pull(&image(), &credential()),
            Err(RuntimeError::Io(_))
        ));
    }
}
