//! Shell script generation for a staged batch.
//!
//! The script runs every task in order, folds the results back into the
//! store, removes fully cracked hashlists, and finally opens a shell and/or
//! powers the node off.

use std::borrow::Cow;

use shell_escape::unix::escape;

use super::StagedTask;
use crate::session::basename;
use crate::store::Namespace;

/// Settings that shape the generated script.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScriptOptions {
    /// Bucket holding the artifact namespaces.
    pub bucket: String,
    /// Full path of the hashcat executable on the node.
    pub hashcat_bin: String,
    /// Endpoint of an S3-compatible service, when not AWS.
    pub endpoint_url: Option<String>,
    /// Open an interactive shell once every task has finished.
    pub shell: bool,
    /// Power the node off at the end.
    pub shutdown: bool,
}

/// Ordered shell statements.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct GeneratedScript {
    lines: Vec<String>,
}

impl GeneratedScript {
    /// Statements in execution order.
    #[must_use]
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Consumes the script, returning its statements.
    #[must_use]
    pub fn into_lines(self) -> Vec<String> {
        self.lines
    }

    /// Renders the statements as newline-terminated text.
    #[must_use]
    pub fn render(&self) -> String {
        self.lines.iter().fold(String::new(), |mut out, line| {
            out.push_str(line);
            out.push('\n');
            out
        })
    }
}

fn quote(value: &str) -> Cow<'_, str> {
    escape(value.into())
}

/// Drops the last extension from the final path component.
fn strip_extension(path: &str) -> &str {
    let name = basename(path);
    match name.rfind('.') {
        Some(dot) if dot > 0 => path
            .len()
            .checked_sub(name.len() - dot)
            .and_then(|end| path.get(..end))
            .unwrap_or(path),
        _ => path,
    }
}

fn join_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> String {
    parts
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// `aws` invocation prefix, carrying `--endpoint-url` when one is set.
pub(crate) fn aws_prefix(endpoint_url: Option<&str>) -> String {
    endpoint_url
        .filter(|url| !url.trim().is_empty())
        .map_or_else(
            || String::from("aws"),
            |url| format!("aws --endpoint-url {}", quote(url)),
        )
}

/// Shell-quoted `s3://` URI of an object.
pub(crate) fn object_uri(bucket: &str, namespace: Namespace, name: &str) -> String {
    quote(&format!("s3://{bucket}/{namespace}/{name}")).into_owned()
}

struct Emitter<'a> {
    options: &'a ScriptOptions,
    aws: String,
    lines: Vec<String>,
}

impl<'a> Emitter<'a> {
    fn new(options: &'a ScriptOptions) -> Self {
        Self {
            options,
            aws: aws_prefix(options.endpoint_url.as_deref()),
            lines: Vec::new(),
        }
    }

    fn uri(&self, namespace: Namespace, name: &str) -> String {
        object_uri(&self.options.bucket, namespace, name)
    }

    fn push(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    fn task(&mut self, index: usize, task: &StagedTask) {
        let target = quote(&task.target).into_owned();
        let target_base = strip_extension(&task.target);
        let base = quote(target_base).into_owned();
        let stem = basename(target_base);
        let hashcat = quote(&self.options.hashcat_bin).into_owned();

        self.push(format!("# batch {index}"));
        self.push(format!("test -f {target}.orig || cp {target} {target}.orig"));

        let mode = format!("-a{}", quote(&task.attack_mode));
        let hash_type = format!("-m{}", quote(&task.hash_type));
        let rules = task
            .rules
            .as_deref()
            .map(|path| format!("-r {}", quote(path)))
            .unwrap_or_default();
        let sources: Vec<String> = task
            .sources
            .iter()
            .map(|source| quote(source).into_owned())
            .collect();
        let mut attack = vec![
            hashcat.as_str(),
            mode.as_str(),
            hash_type.as_str(),
            "--remove",
            rules.as_str(),
            task.extra_args.as_str(),
            target.as_str(),
        ];
        attack.extend(sources.iter().map(String::as_str));
        self.push(join_parts(attack));

        if task.update_hashlist {
            let uri = self.uri(Namespace::Hashlists, basename(&task.target));
            self.push("echo Uploading updated hashlist...");
            self.push(format!("{} s3 cp {target} {uri} >/dev/null", self.aws));
        }

        if task.dump_cracked {
            let uri = self.uri(Namespace::Dumps, &format!("{stem}.dmp"));
            self.push("echo Merging hashdump...");
            self.push(format!(
                "{} s3 cp {uri} {base}.dmp1 >/dev/null 2>&1 || true",
                self.aws
            ));
            self.push(format!(
                "{hashcat} --quiet --show --outfile-format=7 --outfile={base}.dmp2 {target}.orig"
            ));
            self.push(format!("sort -u {base}.dmp? > {base}.dmp"));
            self.push("echo Uploading updated hashdump...");
            self.push(format!("{} s3 cp {base}.dmp {uri} >/dev/null", self.aws));
        }

        if task.make_dict {
            let uri = self.uri(Namespace::Wordlists, &format!("{stem}.dic"));
            self.push("echo Merging wordlist...");
            self.push(format!(
                "{} s3 cp {uri} {base}.dic1 >/dev/null 2>&1 || true",
                self.aws
            ));
            self.push(format!(
                "{hashcat} --quiet --show --outfile-format=2 --outfile={base}.dic2 {target}.orig"
            ));
            self.push(format!(
                "sort {base}.dic? | uniq -c | sort -rn | awk '{{print $2}}' > {base}.dic"
            ));
            self.push("echo Uploading updated wordlist...");
            self.push(format!("{} s3 cp {base}.dic {uri} >/dev/null", self.aws));
        }
    }

    fn cleanup(&mut self, target: &str) {
        let name = basename(target);
        let uri = self.uri(Namespace::Hashlists, name);
        let quoted = quote(target).into_owned();
        self.push(format!(
            "echo Removing {} from the store if fully cracked...",
            quote(name)
        ));
        self.push(format!(
            "test -f {quoted} && test -s {quoted} || {} s3 rm {uri} >/dev/null",
            self.aws
        ));
    }
}

/// Builds the script for `tasks`.
///
/// The output depends only on the inputs. Values derived from user input are
/// shell-quoted, except the extra hashcat arguments, which are passed through
/// verbatim.
#[must_use]
pub fn generate_script(tasks: &[StagedTask], options: &ScriptOptions) -> GeneratedScript {
    let mut emitter = Emitter::new(options);
    for (index, task) in tasks.iter().enumerate() {
        emitter.task(index + 1, task);
    }

    let mut cleaned: Vec<&str> = Vec::new();
    for task in tasks {
        if !cleaned.contains(&task.target.as_str()) {
            cleaned.push(&task.target);
            emitter.cleanup(&task.target);
        }
    }

    if options.shell {
        emitter.push("bash");
    }
    if options.shutdown {
        emitter.push("sudo poweroff");
    }
    GeneratedScript {
        lines: emitter.lines,
    }
}
