use std::path::{Path, PathBuf};

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{Config, TranscodeConfig};
use crate::error::{PipelineError, Result};
use crate::fetch::{self, SongFetcher};
use crate::models::{MergePlan, SourceAsset};
use crate::paths;
use crate::process::{CommandRunner, Invocation};

const NORWEGIAN_MONTHS: [&str; 12] = [
    "januar", "februar", "mars", "april", "mai", "juni", "juli", "august", "september", "oktober",
    "november", "desember",
];

const ENGLISH_MONTHS: [&str; 12] = [
    "January", "February", "March", "April", "May", "June", "July", "August", "September",
    "October", "November", "December",
];

const SPACER_FILENAME: &str = "silence.wav";

/// Month-name table used in compilation filenames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonthLocale {
    #[serde(rename = "nb")]
    Norwegian,
    #[serde(rename = "en")]
    English,
}

impl MonthLocale {
    /// Name of `month` (1-12); `None` outside that range.
    pub fn month_name(self, month: u32) -> Option<&'static str> {
        let table = match self {
            MonthLocale::Norwegian => &NORWEGIAN_MONTHS,
            MonthLocale::English => &ENGLISH_MONTHS,
        };
        let index = usize::try_from(month.checked_sub(1)?).ok()?;
        table.get(index).copied()
    }
}

/// Where the spacer between songs comes from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpacerSource {
    File { path: PathBuf },
    Generated { seconds: f64, sample_rate: u32, channels: u16 },
}

impl SpacerSource {
    /// A generated spacer is written into the run's scratch directory.
    pub fn path(&self, scratch: &Path) -> PathBuf {
        match self {
            SpacerSource::File { path } => path.clone(),
            SpacerSource::Generated { .. } => scratch.join(SPACER_FILENAME),
        }
    }
}

/// Songs taken from the remote list, kept so a replay downloads the same
/// files in the same order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteSongs {
    pub list_url: String,
    pub base_url: String,
    pub extension: String,
    pub filenames: Vec<String>,
}

/// Distribution copy settings, frozen at run time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscodeParameters {
    pub program: String,
    pub quality: String,
    pub title: String,
    pub artist: String,
    pub year: i32,
    pub comment: String,
    pub album: String,
    pub destination: PathBuf,
}

impl TranscodeParameters {
    fn from_config(program: &str, config: &TranscodeConfig, year: i32, destination: PathBuf) -> Self {
        Self {
            program: program.to_string(),
            quality: config.quality.clone(),
            title: config.title.clone(),
            artist: config.artist.clone(),
            year,
            comment: config.comment.clone(),
            album: config.album.clone(),
            destination,
        }
    }

    pub fn invocation(&self, source: &Path) -> Invocation {
        Invocation::new(
            self.program.clone(),
            vec![
                self.quality.clone(),
                "--tt".to_string(),
                self.title.clone(),
                "--ta".to_string(),
                self.artist.clone(),
                "--ty".to_string(),
                self.year.to_string(),
                "--tc".to_string(),
                self.comment.clone(),
                "--tl".to_string(),
                self.album.clone(),
                path_arg(source),
                path_arg(&self.destination),
            ],
        )
    }
}

/// Everything needed to redo a merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeParameters {
    pub program: String,
    /// Local songs. Empty when the songs came from `remote`.
    #[serde(default)]
    pub inputs: Vec<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remote: Option<RemoteSongs>,
    pub spacer: SpacerSource,
    pub show_progress: bool,
    pub concat_target: PathBuf,
    pub transcode: Option<TranscodeParameters>,
}

impl MergeParameters {
    /// Song files in play order. Downloaded songs live in `scratch`.
    pub fn song_paths(&self, scratch: &Path) -> Vec<PathBuf> {
        match &self.remote {
            Some(remote) => remote
                .filenames
                .iter()
                .filter_map(|f| fetch::local_target(scratch, f, &remote.extension))
                .collect(),
            None => self.inputs.clone(),
        }
    }

    /// Concatenation, then the optional transcode. `scratch` holds the
    /// files the run itself produced: downloads and a generated spacer.
    pub fn invocations(&self, scratch: &Path) -> Vec<Invocation> {
        let mut invocations = vec![concat_invocation(
            &self.program,
            &self.song_paths(scratch),
            &self.spacer.path(scratch),
            &self.concat_target,
            self.show_progress,
        )];
        if let Some(transcode) = &self.transcode {
            invocations.push(transcode.invocation(&self.concat_target));
        }
        invocations
    }

    /// The artifact the merge ships.
    pub fn final_output(&self) -> &Path {
        match &self.transcode {
            Some(t) => &t.destination,
            None => &self.concat_target,
        }
    }
}

/// One invocation over the whole list: `a sp b sp ... target`.
pub fn concat_invocation(
    program: &str,
    inputs: &[PathBuf],
    spacer: &Path,
    target: &Path,
    show_progress: bool,
) -> Invocation {
    let mut args = Vec::with_capacity(inputs.len() * 2 + 2);
    if show_progress {
        args.push("--show-progress".to_string());
    }
    for input in inputs {
        args.push(path_arg(input));
        args.push(path_arg(spacer));
    }
    args.push(path_arg(target));
    Invocation::new(program, args)
}

/// `sox -n -r <rate> -c <ch> <target> trim 0.0 <secs>`
pub fn spacer_invocation(program: &str, seconds: f64, sample_rate: u32, channels: u16, target: &Path) -> Invocation {
    Invocation::new(
        program,
        vec![
            "-n".to_string(),
            "-r".to_string(),
            sample_rate.to_string(),
            "-c".to_string(),
            channels.to_string(),
            path_arg(target),
            "trim".to_string(),
            "0.0".to_string(),
            crate::trim::format_seconds(seconds),
        ],
    )
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Songs to merge: local files, or the configured remote list.
#[derive(Debug, Clone)]
pub enum MergeSources {
    Local(Vec<PathBuf>),
    Remote,
}

#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub output: PathBuf,
    pub members: Vec<String>,
    pub parameters: MergeParameters,
    pub invocations: Vec<Invocation>,
    pub created_at: NaiveDateTime,
}

pub struct MergeJob<'a> {
    config: &'a Config,
    runner: &'a dyn CommandRunner,
    fetcher: &'a dyn SongFetcher,
}

impl<'a> MergeJob<'a> {
    pub fn new(config: &'a Config, runner: &'a dyn CommandRunner, fetcher: &'a dyn SongFetcher) -> Self {
        Self { config, runner, fetcher }
    }

    /// Build one compilation. All songs are materialized before any tool
    /// runs; any failure aborts the whole merge and removes partial output.
    pub fn run(&self, sources: &MergeSources, run_at: NaiveDateTime) -> Result<MergeOutcome> {
        if let MergeSources::Local(songs) = sources {
            if songs.is_empty() {
                return Err(PipelineError::EmptyMerge);
            }
        }
        let merge = &self.config.merge;
        merge.validate()?;

        let workdir = tempfile::Builder::new().prefix("expeditious-").tempdir()?;
        let (songs, remote) = self.materialize(sources, workdir.path())?;

        let spacer = match &merge.silence_file {
            Some(path) => SpacerSource::File {
                path: paths::absolutize(path)?,
            },
            None => SpacerSource::Generated {
                seconds: merge.silence_seconds,
                sample_rate: merge.silence_sample_rate,
                channels: merge.silence_channels,
            },
        };
        let plan = MergePlan::new(songs, SourceAsset::new(spacer.path(workdir.path())))?;
        info!(songs = plan.songs().len(), "merging songs");

        let dest_dir = paths::absolutize(&merge.music_dest_dir)?;
        std::fs::create_dir_all(&dest_dir)?;
        let stem = paths::merge_stem(run_at.date(), merge.month_locale());
        let concat_target = dest_dir.join(format!("{}.{}", stem, merge.concat_extension));
        let transcode = merge.transcode().map(|t| {
            TranscodeParameters::from_config(
                &self.config.tools.transcoder,
                t,
                run_at.year(),
                dest_dir.join(format!("{}.{}", stem, t.extension)),
            )
        });

        let inputs = match remote {
            Some(_) => Vec::new(),
            None => plan.songs().iter().map(|s| s.path().to_path_buf()).collect(),
        };
        let parameters = MergeParameters {
            program: self.config.tools.sox.clone(),
            inputs,
            remote,
            spacer,
            show_progress: merge.show_progress,
            concat_target,
            transcode,
        };

        self.prepare_spacer(&parameters.spacer, workdir.path())?;
        let invocations = self.execute(&parameters, workdir.path())?;

        Ok(MergeOutcome {
            output: parameters.final_output().to_path_buf(),
            members: plan.members(),
            parameters,
            invocations,
            created_at: run_at,
        })
    }

    /// Redo a recorded merge in a fresh scratch directory. Remote songs
    /// are downloaded again and a generated spacer is made again. Returns
    /// the commands that ran.
    pub fn replay(&self, parameters: &MergeParameters) -> Result<Vec<Invocation>> {
        let workdir = tempfile::Builder::new().prefix("expeditious-").tempdir()?;
        match &parameters.remote {
            Some(remote) => {
                fetch::download_all(
                    self.fetcher,
                    &remote.base_url,
                    &remote.extension,
                    &remote.filenames,
                    workdir.path(),
                )?;
            }
            None => {
                for input in &parameters.inputs {
                    SourceAsset::new(input).ensure_exists()?;
                }
            }
        }
        if parameters.song_paths(workdir.path()).is_empty() {
            return Err(PipelineError::EmptyMerge);
        }
        if let Some(parent) = parameters.concat_target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.prepare_spacer(&parameters.spacer, workdir.path())?;
        self.execute(parameters, workdir.path())
    }

    fn materialize(
        &self,
        sources: &MergeSources,
        workdir: &Path,
    ) -> Result<(Vec<SourceAsset>, Option<RemoteSongs>)> {
        match sources {
            MergeSources::Local(songs) => {
                let songs = songs
                    .iter()
                    .map(|p| -> Result<SourceAsset> {
                        let asset = SourceAsset::new(paths::absolutize(p)?);
                        asset.ensure_exists()?;
                        Ok(asset)
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok((songs, None))
            }
            MergeSources::Remote => {
                let merge = &self.config.merge;
                let list_url = merge.song_list_url.as_deref().ok_or_else(|| {
                    PipelineError::Config("merge.song_list_url is required for remote merges".to_string())
                })?;
                let base_url = merge.song_base_url.as_deref().ok_or_else(|| {
                    PipelineError::Config("merge.song_base_url is required for remote merges".to_string())
                })?;
                let remote = RemoteSongs {
                    list_url: list_url.to_string(),
                    base_url: base_url.to_string(),
                    extension: merge.song_extension.clone(),
                    filenames: fetch::list_songs(self.fetcher, list_url)?,
                };
                let songs = fetch::download_all(
                    self.fetcher,
                    &remote.base_url,
                    &remote.extension,
                    &remote.filenames,
                    workdir,
                )?;
                Ok((songs, Some(remote)))
            }
        }
    }

    fn prepare_spacer(&self, spacer: &SpacerSource, scratch: &Path) -> Result<()> {
        let path = spacer.path(scratch);
        match spacer {
            SpacerSource::File { .. } => SourceAsset::new(path).ensure_exists(),
            SpacerSource::Generated {
                seconds,
                sample_rate,
                channels,
            } => {
                let invocation = spacer_invocation(&self.config.tools.sox, *seconds, *sample_rate, *channels, &path);
                self.runner.run(&invocation)?;
                Ok(())
            }
        }
    }

    fn execute(&self, parameters: &MergeParameters, scratch: &Path) -> Result<Vec<Invocation>> {
        let invocations = parameters.invocations(scratch);
        let outputs: Vec<&Path> = std::iter::once(parameters.concat_target.as_path())
            .chain(parameters.transcode.as_ref().map(|t| t.destination.as_path()))
            .collect();

        for invocation in &invocations {
            if let Err(e) = self.runner.run(invocation) {
                remove_partial(&outputs);
                return Err(e);
            }
        }

        if let Some(transcode) = &parameters.transcode {
            if transcode.destination.exists() && transcode.destination != parameters.concat_target {
                info!(path = %parameters.concat_target.display(), "removing full-resolution merge");
                if let Err(e) = std::fs::remove_file(&parameters.concat_target) {
                    warn!(path = %parameters.concat_target.display(), error = %e, "could not remove intermediate");
                }
            }
        }
        Ok(invocations)
    }
}

fn remove_partial(outputs: &[&Path]) {
    for path in outputs {
        if path.exists() {
            warn!(path = %path.display(), "removing partial merge output");
            let _ = std::fs::remove_file(path);
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::fetch::fake::StubFetcher;
    use crate::process::fake::RecordingRunner;

    fn run_at(y: i32, m: u32, d: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d).unwrap().and_hms_opt(12, 30, 0).unwrap()
    }

    fn args(strs: &[&Path]) -> Vec<String> {
        strs.iter().map(|p| p.to_string_lossy().into_owned()).collect()
    }

    /// Command lines with the per-run scratch directory masked out.
    fn masked(invocations: &[Invocation]) -> Vec<Vec<String>> {
        invocations
            .iter()
            .map(|inv| {
                std::iter::once(inv.program.clone())
                    .chain(inv.arguments.iter().map(|arg| {
                        let path = Path::new(arg);
                        let in_scratch = path
                            .parent()
                            .and_then(Path::file_name)
                            .map(|d| d.to_string_lossy().starts_with("expeditious-"))
                            .unwrap_or(false);
                        match (in_scratch, path.file_name()) {
                            (true, Some(name)) => format!("<scratch>/{}", name.to_string_lossy()),
                            _ => arg.clone(),
                        }
                    }))
                    .collect()
            })
            .collect()
    }

    struct Fixture {
        dir: tempfile::TempDir,
        config: Config,
    }

    impl Fixture {
        fn new(transcode: bool) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let spacer = dir.path().join("silence.wav");
            std::fs::write(&spacer, b"quiet").unwrap();
            let mut config = Config::default();
            config.merge.silence_file = Some(spacer);
            config.merge.music_dest_dir = dir.path().join("out");
            config.merge.transcode.enabled = transcode;
            Self { dir, config }
        }

        fn song(&self, name: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            std::fs::write(&path, b"song").unwrap();
            path
        }

        fn spacer(&self) -> PathBuf {
            self.dir.path().join("silence.wav")
        }

        fn out(&self, name: &str) -> PathBuf {
            self.dir.path().join("out").join(name)
        }

        fn remote(mut self) -> Self {
            self.config.merge.silence_file = None;
            self.config.merge.song_list_url = Some("http://h/list.json".to_string());
            self.config.merge.song_base_url = Some("http://h/songs/".to_string());
            self
        }
    }

    #[test]
    fn test_month_names() {
        assert_eq!(MonthLocale::Norwegian.month_name(3), Some("mars"));
        assert_eq!(MonthLocale::Norwegian.month_name(12), Some("desember"));
        assert_eq!(MonthLocale::English.month_name(1), Some("January"));
        assert_eq!(MonthLocale::English.month_name(0), None);
        assert_eq!(MonthLocale::English.month_name(13), None);
    }

    #[test]
    fn test_concat_ordering() {
        let inputs = vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")];
        let inv = concat_invocation("sox", &inputs, Path::new("sp"), Path::new("t"), false);
        assert_eq!(inv.arguments, vec!["a", "sp", "b", "sp", "c", "sp", "t"]);

        let inv = concat_invocation("sox", &inputs[..1], Path::new("sp"), Path::new("t"), false);
        assert_eq!(inv.arguments, vec!["a", "sp", "t"]);
    }

    #[test]
    fn test_concat_progress_flag_precedes_files() {
        let inv = concat_invocation("sox", &[PathBuf::from("a")], Path::new("sp"), Path::new("t"), true);
        assert_eq!(inv.arguments, vec!["--show-progress", "a", "sp", "t"]);
    }

    #[test]
    fn test_empty_merge_fails_before_any_tool() {
        let fixture = Fixture::new(false);
        let runner = RecordingRunner::new();
        let fetcher = StubFetcher::new(&[]);
        let job = MergeJob::new(&fixture.config, &runner, &fetcher);

        let err = job.run(&MergeSources::Local(vec![]), run_at(2024, 3, 1)).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyMerge));

        let err = job.run(&MergeSources::Remote, run_at(2024, 3, 1));
        assert!(err.is_err());
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_empty_remote_list_fails_before_any_tool() {
        let mut fixture = Fixture::new(false);
        fixture.config.merge.song_list_url = Some("http://h/list.json".to_string());
        fixture.config.merge.song_base_url = Some("http://h/".to_string());
        let runner = RecordingRunner::new();
        let fetcher = StubFetcher::new(&[]);
        let job = MergeJob::new(&fixture.config, &runner, &fetcher);

        let err = job.run(&MergeSources::Remote, run_at(2024, 3, 1)).unwrap_err();
        assert!(matches!(err, PipelineError::EmptyMerge));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_single_song_merge() {
        let fixture = Fixture::new(false);
        let song = fixture.song("1.ogg");
        let runner = RecordingRunner::new();
        let fetcher = StubFetcher::new(&[]);
        let job = MergeJob::new(&fixture.config, &runner, &fetcher);

        let outcome = job.run(&MergeSources::Local(vec![song.clone()]), run_at(2024, 3, 1)).unwrap();
        let target = fixture.out("2024.03.01 - mars.flac");
        assert_eq!(outcome.output, target);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "sox");
        assert_eq!(calls[0].arguments, args(&[&song, &fixture.spacer(), &target]));
    }

    #[test]
    fn test_three_song_merge_is_one_invocation_in_order() {
        let fixture = Fixture::new(false);
        let a = fixture.song("a.ogg");
        let b = fixture.song("b.ogg");
        let c = fixture.song("c.ogg");
        let runner = RecordingRunner::new();
        let fetcher = StubFetcher::new(&[]);
        let job = MergeJob::new(&fixture.config, &runner, &fetcher);

        let outcome = job
            .run(&MergeSources::Local(vec![a.clone(), b.clone(), c.clone()]), run_at(2024, 3, 1))
            .unwrap();
        let sp = fixture.spacer();
        let target = fixture.out("2024.03.01 - mars.flac");

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].arguments, args(&[&a, &sp, &b, &sp, &c, &sp, &target]));
        assert_eq!(outcome.members, vec!["a.ogg", "b.ogg", "c.ogg"]);
    }

    #[test]
    fn test_transcode_replaces_intermediate() {
        let fixture = Fixture::new(true);
        let songs = vec![fixture.song("1.ogg"), fixture.song("2.ogg")];
        let runner = RecordingRunner::new().touching_outputs();
        let fetcher = StubFetcher::new(&[]);
        let job = MergeJob::new(&fixture.config, &runner, &fetcher);

        let outcome = job.run(&MergeSources::Local(songs), run_at(2024, 3, 1)).unwrap();
        let mp3 = fixture.out("2024.03.01 - mars.mp3");
        let flac = fixture.out("2024.03.01 - mars.flac");
        assert_eq!(outcome.output, mp3);
        assert!(mp3.exists());
        assert!(!flac.exists(), "intermediate should be removed after transcoding");

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        let transcode = &calls[1];
        assert_eq!(transcode.program, "lame");
        assert_eq!(
            transcode.arguments,
            vec![
                "-V2".to_string(),
                "--tt".to_string(),
                "Toppsang".to_string(),
                "--ta".to_string(),
                "Telemark".to_string(),
                "--ty".to_string(),
                "2024".to_string(),
                "--tc".to_string(),
                "Compiled by expeditious".to_string(),
                "--tl".to_string(),
                "Toppsanger".to_string(),
                flac.to_string_lossy().into_owned(),
                mp3.to_string_lossy().into_owned(),
            ]
        );
    }

    #[test]
    fn test_failed_transcode_leaves_no_output() {
        let fixture = Fixture::new(true);
        let songs = vec![fixture.song("1.ogg")];
        let runner = RecordingRunner::new().touching_outputs().failing("lame");
        let fetcher = StubFetcher::new(&[]);
        let job = MergeJob::new(&fixture.config, &runner, &fetcher);

        let err = job.run(&MergeSources::Local(songs), run_at(2024, 3, 1)).unwrap_err();
        assert!(matches!(err, PipelineError::ExternalTool { ref command, .. } if command == "lame"));
        assert!(!fixture.out("2024.03.01 - mars.flac").exists());
        assert!(!fixture.out("2024.03.01 - mars.mp3").exists());
    }

    #[test]
    fn test_failed_fetch_never_concatenates() {
        let fixture = Fixture::new(false).remote();
        let runner = RecordingRunner::new().touching_outputs();
        let fetcher = StubFetcher::new(&["1", "2", "3"]).failing_on("http://h/songs/2.mp3");
        let job = MergeJob::new(&fixture.config, &runner, &fetcher);

        let err = job.run(&MergeSources::Remote, run_at(2024, 3, 1)).unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { .. }));
        assert!(runner.calls().is_empty(), "no tool may run after a failed fetch");
        assert!(!fixture.dir.path().join("out").join("2024.03.01 - mars.flac").exists());
        assert_eq!(fetcher.downloads.borrow().len(), 2);
    }

    #[test]
    fn test_remote_merge_generates_spacer() {
        let fixture = Fixture::new(false).remote();
        let runner = RecordingRunner::new();
        let fetcher = StubFetcher::new(&["x", "y"]);
        let job = MergeJob::new(&fixture.config, &runner, &fetcher);

        let outcome = job.run(&MergeSources::Remote, run_at(2024, 11, 5)).unwrap();
        assert_eq!(outcome.members, vec!["x.mp3", "y.mp3"]);
        assert_eq!(outcome.output, fixture.out("2024.11.05 - november.flac"));

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(&calls[0].arguments[..5], &["-n", "-r", "44100", "-c", "2"]);
        assert_eq!(&calls[0].arguments[6..], &["trim", "0.0", "3.0"]);
        let spacer = &calls[0].arguments[5];
        assert!(spacer.ends_with("silence.wav"));
        assert_eq!(calls[1].arguments[1], *spacer);
        assert_eq!(calls[1].arguments[3], *spacer);
        assert!(matches!(outcome.parameters.spacer, SpacerSource::Generated { .. }));

        // Downloads vanish with the scratch directory, so the record keeps
        // where they came from instead of where they landed.
        assert!(outcome.parameters.inputs.is_empty());
        assert_eq!(
            outcome.parameters.remote,
            Some(RemoteSongs {
                list_url: "http://h/list.json".to_string(),
                base_url: "http://h/songs/".to_string(),
                extension: "mp3".to_string(),
                filenames: vec!["x".to_string(), "y".to_string()],
            })
        );
    }

    #[test]
    fn test_clashing_extensions_fail_before_any_tool() {
        let mut fixture = Fixture::new(true);
        fixture.config.merge.concat_extension = "mp3".to_string();
        let song = fixture.song("1.ogg");
        let runner = RecordingRunner::new();
        let fetcher = StubFetcher::new(&[]);
        let job = MergeJob::new(&fixture.config, &runner, &fetcher);

        let err = job.run(&MergeSources::Local(vec![song]), run_at(2024, 3, 1)).unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_replay_with_file_spacer_and_transcode_repeats_commands() {
        let fixture = Fixture::new(true);
        let songs = vec![fixture.song("1.ogg"), fixture.song("2.ogg")];
        let fetcher = StubFetcher::new(&[]);
        let first = RecordingRunner::new().touching_outputs();
        let outcome = MergeJob::new(&fixture.config, &first, &fetcher)
            .run(&MergeSources::Local(songs), run_at(2024, 3, 1))
            .unwrap();
        std::fs::remove_file(&outcome.output).unwrap();

        let second = RecordingRunner::new().touching_outputs();
        let replayed = MergeJob::new(&fixture.config, &second, &fetcher)
            .replay(&outcome.parameters)
            .unwrap();

        assert_eq!(replayed, outcome.invocations);
        assert_eq!(second.calls(), first.calls());
        assert!(fixture.out("2024.03.01 - mars.mp3").exists());
        assert!(!fixture.out("2024.03.01 - mars.flac").exists());
    }

    #[test]
    fn test_replay_regenerates_spacer_in_fresh_scratch() {
        let mut fixture = Fixture::new(false);
        fixture.config.merge.silence_file = None;
        let songs = vec![fixture.song("1.ogg"), fixture.song("2.ogg")];
        let fetcher = StubFetcher::new(&[]);
        let first = RecordingRunner::new();
        let outcome = MergeJob::new(&fixture.config, &first, &fetcher)
            .run(&MergeSources::Local(songs), run_at(2024, 3, 1))
            .unwrap();

        let second = RecordingRunner::new();
        let replayed = MergeJob::new(&fixture.config, &second, &fetcher)
            .replay(&outcome.parameters)
            .unwrap();
        assert_eq!(masked(&replayed), masked(&outcome.invocations));

        let (before, after) = (first.calls(), second.calls());
        assert_eq!(after.len(), 2);
        assert_eq!(masked(&after), masked(&before));
        let spacer = Path::new(&after[0].arguments[5]);
        assert_ne!(after[0].arguments[5], before[0].arguments[5]);
        assert!(!spacer.parent().unwrap().exists(), "scratch directory outlived the replay");
    }

    #[test]
    fn test_replay_downloads_remote_songs_again() {
        let fixture = Fixture::new(false).remote();
        let first_fetcher = StubFetcher::new(&["x", "y"]);
        let runner = RecordingRunner::new();
        let outcome = MergeJob::new(&fixture.config, &runner, &first_fetcher)
            .run(&MergeSources::Remote, run_at(2024, 3, 1))
            .unwrap();

        // The song list may have changed since; replay sticks to the record.
        let second_fetcher = StubFetcher::new(&["z"]);
        let replayed = MergeJob::new(&fixture.config, &runner, &second_fetcher)
            .replay(&outcome.parameters)
            .unwrap();

        assert_eq!(*second_fetcher.downloads.borrow(), *first_fetcher.downloads.borrow());
        assert_eq!(masked(&replayed), masked(&outcome.invocations));
        assert_eq!(
            masked(&replayed)[0][1..5],
            ["<scratch>/x.mp3", "<scratch>/silence.wav", "<scratch>/y.mp3", "<scratch>/silence.wav"]
        );
    }

    #[test]
    fn test_replay_failed_download_runs_nothing() {
        let fixture = Fixture::new(false).remote();
        let fetcher = StubFetcher::new(&["x", "y"]);
        let outcome = MergeJob::new(&fixture.config, &RecordingRunner::new(), &fetcher)
            .run(&MergeSources::Remote, run_at(2024, 3, 1))
            .unwrap();

        let runner = RecordingRunner::new();
        let failing = StubFetcher::new(&[]).failing_on("http://h/songs/y.mp3");
        let err = MergeJob::new(&fixture.config, &runner, &failing)
            .replay(&outcome.parameters)
            .unwrap_err();
        assert!(matches!(err, PipelineError::Fetch { .. }));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_replay_missing_local_song_fails() {
        let fixture = Fixture::new(false);
        let song = fixture.song("1.ogg");
        let fetcher = StubFetcher::new(&[]);
        let outcome = MergeJob::new(&fixture.config, &RecordingRunner::new(), &fetcher)
            .run(&MergeSources::Local(vec![song.clone()]), run_at(2024, 3, 1))
            .unwrap();
        std::fs::remove_file(&song).unwrap();

        let runner = RecordingRunner::new();
        let err = MergeJob::new(&fixture.config, &runner, &fetcher)
            .replay(&outcome.parameters)
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound(_)));
        assert!(runner.calls().is_empty());
    }

    #[test]
    fn test_missing_local_song_fails_fast() {
        let fixture = Fixture::new(false);
        let runner = RecordingRunner::new();
        let fetcher = StubFetcher::new(&[]);
        let job = MergeJob::new(&fixture.config, &runner, &fetcher);

        let err = job
            .run(&MergeSources::Local(vec![fixture.dir.path().join("missing.ogg")]), run_at(2024, 3, 1))
            .unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotFound(_)));
        assert!(runner.calls().is_empty());
    }
}
