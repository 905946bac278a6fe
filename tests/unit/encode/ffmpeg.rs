use super::*;

fn opts(encoding: FrameEncoding) -> FfmpegSinkOpts {
    FfmpegSinkOpts {
        out_path: PathBuf::from("out/zoom.mp4"),
        overwrite: true,
        width: 4,
        height: 2,
        fps: 30,
        encoding,
        high_water_bytes: 1024,
    }
}

fn has_pair(args: &[OsString], flag: &str, value: &str) -> bool {
    args.windows(2)
        .any(|w| w[0] == OsString::from(flag) && w[1] == OsString::from(value))
}

#[test]
fn raw_rgba_args_describe_the_frame_layout() {
    let args = opts(FrameEncoding::RawRgba).args();
    assert_eq!(args[0], OsString::from("-y"));
    assert!(has_pair(&args, "-f", "rawvideo"));
    assert!(has_pair(&args, "-pix_fmt", "rgba"));
    assert!(has_pair(&args, "-s", "4x2"));
    assert!(has_pair(&args, "-r", "30"));
    assert!(has_pair(&args, "-i", "pipe:0"));
    assert!(has_pair(&args, "-pix_fmt", "yuv420p"));
    assert_eq!(args.last(), Some(&OsString::from("out/zoom.mp4")));
}

#[test]
fn png_args_use_an_image_pipe() {
    let mut o = opts(FrameEncoding::Png);
    o.overwrite = false;
    let args = o.args();
    assert_eq!(args[0], OsString::from("-n"));
    assert!(has_pair(&args, "-f", "image2pipe"));
    assert!(has_pair(&args, "-c:v", "png"));
    assert!(!has_pair(&args, "-f", "rawvideo"));
}

#[test]
fn odd_dimensions_are_rejected() {
    let mut o = opts(FrameEncoding::RawRgba);
    o.width = 5;
    assert!(o.validate().is_err());
    o.width = 4;
    o.fps = 0;
    assert!(o.validate().is_err());
}

#[test]
fn ensure_parent_dir_creates_missing_directories() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("a/b/zoom.mp4");
    ensure_parent_dir(&out).unwrap();
    assert!(dir.path().join("a/b").is_dir());
    ensure_parent_dir(Path::new("zoom.mp4")).unwrap();
}

#[cfg(unix)]
fn shell(script: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(script);
    cmd
}

#[cfg(unix)]
#[test]
fn consumer_receives_frames_in_order_and_finishes() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("stream.bin");
    let cmd = shell(&format!("cat > '{}'", out.display()));
    let mut sink = FfmpegSink::from_command(cmd, Some(4), 1024).unwrap();

    sink.write_frame(FrameIndex(1), vec![1, 1, 1, 1]).unwrap();
    sink.write_frame(FrameIndex(2), vec![2, 2, 2, 2]).unwrap();
    sink.end_input().unwrap();
    assert_eq!(
        sink.await_finish(Duration::from_secs(10)).unwrap(),
        FinishStatus::Finished
    );
    // Finished is sticky.
    assert_eq!(
        sink.await_finish(Duration::ZERO).unwrap(),
        FinishStatus::Finished
    );
    assert_eq!(std::fs::read(&out).unwrap(), vec![1, 1, 1, 1, 2, 2, 2, 2]);
}

#[cfg(unix)]
#[test]
fn wrong_sized_or_out_of_order_frames_are_rejected() {
    let mut sink = FfmpegSink::from_command(shell("cat > /dev/null"), Some(4), 1024).unwrap();
    assert!(sink.write_frame(FrameIndex(1), vec![0; 3]).is_err());
    sink.write_frame(FrameIndex(2), vec![0; 4]).unwrap();
    assert!(sink.write_frame(FrameIndex(2), vec![0; 4]).is_err());
    sink.end_input().unwrap();
    sink.await_finish(Duration::from_secs(10)).unwrap();
}

#[cfg(unix)]
#[test]
fn non_zero_exit_surfaces_stderr() {
    let mut sink =
        FfmpegSink::from_command(shell("cat > /dev/null; echo boom >&2; exit 3"), None, 1024)
            .unwrap();
    sink.end_input().unwrap();
    let err = sink.await_finish(Duration::from_secs(10)).unwrap_err();
    assert!(err.to_string().contains("boom"), "{err}");
}

#[cfg(unix)]
#[test]
fn unresponsive_consumer_reports_pending_and_can_be_killed() {
    let mut sink = FfmpegSink::from_command(shell("sleep 30"), None, 1024).unwrap();
    sink.end_input().unwrap();
    assert_eq!(
        sink.await_finish(Duration::from_millis(50)).unwrap(),
        FinishStatus::Pending
    );
    sink.kill().unwrap();
}

#[cfg(target_os = "linux")]
#[test]
fn dropping_an_unfinished_sink_kills_and_reaps_the_consumer() {
    let sink = FfmpegSink::from_command(shell("exec sleep 30"), None, 1024).unwrap();
    let proc_dir = PathBuf::from(format!("/proc/{}", sink.child.id()));
    assert!(proc_dir.exists());

    drop(sink);
    // A reaped child no longer has a /proc entry; a zombie would.
    assert!(!proc_dir.exists());
}
