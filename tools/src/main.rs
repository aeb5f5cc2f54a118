//! `opi`: a command-line driver for the OPI substitution engine.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;

use log::Level;

use opi_cli::args::{ArgParser, FlagDef, ParsedArg};
use opi_cli::logging::DualLogger;
use opi_cli::resolve::FileResolver;
use opi_engine::config::{CropRounding, EngineConfig, IccProfiles, Newline, RenderingIntent, ResampleFilter};
use opi_engine::Engine;

const FLAGS: &[FlagDef] = &[
    FlagDef::valued("hires"),
    FlagDef::valued("lores"),
    FlagDef::valued("in"),
    FlagDef::valued("out"),
    FlagDef::valued("cachemegs"),
    FlagDef::flag("usecache"),
    FlagDef::flag("nousecache"),
    FlagDef::flag("usediskcache"),
    FlagDef::valued("diskcachedir"),
    FlagDef::flag("abortonerror"),
    FlagDef::flag("noabortonerror"),
    FlagDef::flag("abortonfilenotfound"),
    FlagDef::flag("noabortonfilenotfound"),
    FlagDef::flag("convertcmykimages"),
    FlagDef::flag("convertgrayimages"),
    FlagDef::flag("detectcmykgrayimages"),
    FlagDef::flag("nodetectcmykgrayimages"),
    FlagDef::flag("cmykgrayimages_stripcmy"),
    FlagDef::valued("imagecropthreshold"),
    FlagDef::valued("croprounding"),
    FlagDef::flag("monoimagedownsample"),
    FlagDef::flag("nomonoimagedownsample"),
    FlagDef::valued("monoimageresolution"),
    FlagDef::valued("monoimageminresolution"),
    FlagDef::valued("monoimagedownsamplethreshold"),
    FlagDef::valued("monoimagefilter"),
    FlagDef::flag("grayimagedownsample"),
    FlagDef::flag("nograyimagedownsample"),
    FlagDef::valued("grayimageresolution"),
    FlagDef::valued("grayimageminresolution"),
    FlagDef::valued("grayimagedownsamplethreshold"),
    FlagDef::valued("grayimagefilter"),
    FlagDef::flag("colorimagedownsample"),
    FlagDef::flag("nocolorimagedownsample"),
    FlagDef::valued("colorimageresolution"),
    FlagDef::valued("colorimageminresolution"),
    FlagDef::valued("colorimagedownsamplethreshold"),
    FlagDef::valued("colorimagefilter"),
    FlagDef::valued("intent"),
    FlagDef::valued("proofintent"),
    FlagDef::flag("preserveblack"),
    FlagDef::flag("blackpointcompensation"),
    FlagDef::flag("softproofing"),
    FlagDef::valued("monooutprofile"),
    FlagDef::valued("grayoutprofile"),
    FlagDef::valued("coloroutprofile"),
    FlagDef::valued("proofprofile"),
    FlagDef::valued("sameprofiles"),
    FlagDef::flag("detectqxpbackground"),
    FlagDef::valued("mode"),
    FlagDef::valued("newline"),
    FlagDef::flag("opi13"),
    FlagDef::flag("noopi13"),
    FlagDef::flag("opi20"),
    FlagDef::flag("noopi20"),
    FlagDef::valued("log"),
    FlagDef::flag("verbose"),
    FlagDef::flag("help"),
];

struct Options {
    hires_roots: Vec<PathBuf>,
    lores_roots: Vec<PathBuf>,
    in_path: Option<PathBuf>,
    out_path: Option<PathBuf>,
    disk_cache_dir: Option<PathBuf>,
    log_path: Option<PathBuf>,
    verbose: bool,
    help: bool,
    config: EngineConfig,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            hires_roots: Vec::new(),
            lores_roots: Vec::new(),
            in_path: None,
            out_path: None,
            disk_cache_dir: None,
            log_path: None,
            verbose: false,
            help: false,
            config: EngineConfig::default(),
        }
    }
}

fn print_usage() {
    println!("opi -in=<file> -out=<file> [-hires=<dir>]... [-lores=<dir>]... [options]");
    println!("See spec §6 for the full flag list. -help, --help, or /? prints this message.");
}

fn parse_options(raw_args: Vec<String>) -> Result<Options, String> {
    let parser = ArgParser::new(FLAGS);
    let mut opts = Options::default();

    for parsed in parser.parse(raw_args) {
        match parsed {
            ParsedArg::Flag(name) => apply_flag(&mut opts, &name),
            ParsedArg::Valued(name, value) => apply_valued(&mut opts, &name, &value)?,
            ParsedArg::Positional(p) => return Err(format!("unexpected positional argument: {p}")),
            ParsedArg::Unknown(u) => return Err(format!("unrecognized option: {u}")),
        }
    }
    Ok(opts)
}

fn apply_flag(opts: &mut Options, name: &str) {
    let c = &mut opts.config;
    match name {
        "usecache" => c.use_cache = true,
        "nousecache" => c.use_cache = false,
        "usediskcache" => c.use_disk_cache = true,
        "abortonerror" => c.abort_on_error = true,
        "noabortonerror" => c.abort_on_error = false,
        "abortonfilenotfound" => c.abort_on_file_not_found = true,
        "noabortonfilenotfound" => c.abort_on_file_not_found = false,
        "convertcmykimages" => c.convert_cmyk_images = true,
        "convertgrayimages" => c.convert_gray_images = true,
        "detectcmykgrayimages" => c.detect_cmyk_gray_images = true,
        "nodetectcmykgrayimages" => c.detect_cmyk_gray_images = false,
        "cmykgrayimages_stripcmy" => c.cmyk_gray_images_strip_cmy = true,
        "monoimagedownsample" => c.mono.downsample = true,
        "nomonoimagedownsample" => c.mono.downsample = false,
        "grayimagedownsample" => c.gray.downsample = true,
        "nograyimagedownsample" => c.gray.downsample = false,
        "colorimagedownsample" => c.color.downsample = true,
        "nocolorimagedownsample" => c.color.downsample = false,
        "preserveblack" => c.preserve_black = true,
        "blackpointcompensation" => c.black_point_compensation = true,
        "softproofing" => c.softproofing = true,
        "detectqxpbackground" => c.detect_qxp_background = true,
        "opi13" => c.emit_opi_1_3 = true,
        "noopi13" => c.emit_opi_1_3 = false,
        "opi20" => c.emit_opi_2_0 = true,
        "noopi20" => c.emit_opi_2_0 = false,
        "verbose" => opts.verbose = true,
        "help" => opts.help = true,
        other => log::warn!("flag -{other} recognized but has no effect"),
    }
}

fn apply_valued(opts: &mut Options, name: &str, value: &str) -> Result<(), String> {
    let err = |field: &str| format!("invalid value for -{name}: {value} ({field})");
    match name {
        "hires" => opts.hires_roots.push(PathBuf::from(value)),
        "lores" => opts.lores_roots.push(PathBuf::from(value)),
        "in" => opts.in_path = Some(PathBuf::from(value)),
        "out" => opts.out_path = Some(PathBuf::from(value)),
        "diskcachedir" => opts.disk_cache_dir = Some(PathBuf::from(value)),
        "log" => opts.log_path = Some(PathBuf::from(value)),
        "cachemegs" => opts.config.cache_megs = value.parse().map_err(|_| err("number"))?,
        "imagecropthreshold" => opts.config.image_crop_threshold = value.parse().map_err(|_| err("number"))?,
        "croprounding" => {
            opts.config.crop_rounding_override = Some(match value {
                "standard" => CropRounding::Standard,
                "opi2ceilpad" => CropRounding::Opi2CeilPad,
                _ => return Err(err("standard|opi2ceilpad")),
            });
        }
        "monoimageresolution" => opts.config.mono.resolution = value.parse().map_err(|_| err("number"))?,
        "monoimageminresolution" => opts.config.mono.min_resolution = value.parse().map_err(|_| err("number"))?,
        "monoimagedownsamplethreshold" => opts.config.mono.downsample_threshold = value.parse().map_err(|_| err("number"))?,
        "monoimagefilter" => opts.config.mono.downsample_filter = value.parse::<ResampleFilter>().map_err(|_| err("filter"))?,
        "grayimageresolution" => opts.config.gray.resolution = value.parse().map_err(|_| err("number"))?,
        "grayimageminresolution" => opts.config.gray.min_resolution = value.parse().map_err(|_| err("number"))?,
        "grayimagedownsamplethreshold" => opts.config.gray.downsample_threshold = value.parse().map_err(|_| err("number"))?,
        "grayimagefilter" => opts.config.gray.downsample_filter = value.parse::<ResampleFilter>().map_err(|_| err("filter"))?,
        "colorimageresolution" => opts.config.color.resolution = value.parse().map_err(|_| err("number"))?,
        "colorimageminresolution" => opts.config.color.min_resolution = value.parse().map_err(|_| err("number"))?,
        "colorimagedownsamplethreshold" => opts.config.color.downsample_threshold = value.parse().map_err(|_| err("number"))?,
        "colorimagefilter" => opts.config.color.downsample_filter = value.parse::<ResampleFilter>().map_err(|_| err("filter"))?,
        "intent" => opts.config.intent = value.parse::<RenderingIntent>().map_err(|_| err("intent"))?,
        "proofintent" => opts.config.proof_intent = value.parse::<RenderingIntent>().map_err(|_| err("intent"))?,
        "monooutprofile" => load_profile(&mut opts.config.icc_profiles, ProfileSlot::Mono, value)?,
        "grayoutprofile" => load_profile(&mut opts.config.icc_profiles, ProfileSlot::Gray, value)?,
        "coloroutprofile" => load_profile(&mut opts.config.icc_profiles, ProfileSlot::Color, value)?,
        "proofprofile" => load_profile(&mut opts.config.icc_profiles, ProfileSlot::Proof, value)?,
        "sameprofiles" => opts.config.same_profiles_sets.push(value.split(',').map(str::trim).map(str::to_string).collect()),
        "mode" => opts.config.binary_mode = match value {
            "binary" => true,
            "ascii" | "hex" => false,
            _ => return Err(err("binary|ascii")),
        },
        "newline" => opts.config.newline = value.parse::<Newline>().map_err(|_| err("newline"))?,
        other => log::warn!("flag -{other}={value} recognized but has no effect"),
    }
    Ok(())
}

enum ProfileSlot {
    Mono,
    Gray,
    Color,
    Proof,
}

fn load_profile(profiles: &mut IccProfiles, slot: ProfileSlot, path: &str) -> Result<(), String> {
    let bytes = fs::read(path).map_err(|e| format!("reading ICC profile {path}: {e}"))?;
    match slot {
        ProfileSlot::Mono => {
            profiles.mono_profile = Some(bytes);
            profiles.mono_path = Some(path.to_string());
        }
        ProfileSlot::Gray => {
            profiles.gray_profile = Some(bytes);
            profiles.gray_path = Some(path.to_string());
        }
        ProfileSlot::Color => {
            profiles.color_profile = Some(bytes);
            profiles.color_path = Some(path.to_string());
        }
        ProfileSlot::Proof => {
            profiles.proof_profile = Some(bytes);
            profiles.proof_path = Some(path.to_string());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let raw_args: Vec<String> = std::env::args().skip(1).collect();
    let opts = match parse_options(raw_args) {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("{msg}");
            print_usage();
            return ExitCode::FAILURE;
        }
    };

    if opts.help {
        print_usage();
        return ExitCode::SUCCESS;
    }

    let level = if opts.verbose { Level::Debug } else { Level::Info };
    if let Err(e) = DualLogger::init(level, opts.log_path.as_deref()) {
        eprintln!("failed to initialize logging: {e}");
    }

    let Some(in_path) = &opts.in_path else {
        eprintln!("-in=<file> is required");
        return ExitCode::FAILURE;
    };
    let Some(out_path) = &opts.out_path else {
        eprintln!("-out=<file> is required");
        return ExitCode::FAILURE;
    };

    let input = match fs::read(in_path) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("reading {}: {e}", in_path.display());
            return ExitCode::FAILURE;
        }
    };

    let resolver = FileResolver::new(opts.hires_roots.clone(), opts.lores_roots.clone());
    let mut engine = Engine::new(opts.config, opts.disk_cache_dir.clone());
    let mut output = Vec::new();
    let cancel = AtomicBool::new(false);

    match engine.run(&input, &resolver, &mut output, &cancel) {
        Ok(stats) => {
            if let Err(e) = fs::write(out_path, &output) {
                eprintln!("writing {}: {e}", out_path.display());
                return ExitCode::FAILURE;
            }
            log::info!(
                "substituted {} object(s), {} error(s)",
                stats.objects_substituted,
                stats.error_count
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            log::error!("aborting: {err}");
            // On an aborting error the output file is rewritten to zero
            // bytes rather than left containing a partial substitution.
            let _ = fs::write(out_path, []);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_required_in_out_and_a_few_flags() {
        let opts = parse_options(vec![
            "-in=a.ps".to_string(),
            "-out=b.ps".to_string(),
            "-verbose".to_string(),
            "-cachemegs=128".to_string(),
        ])
        .unwrap();
        assert_eq!(opts.in_path, Some(PathBuf::from("a.ps")));
        assert_eq!(opts.out_path, Some(PathBuf::from("b.ps")));
        assert!(opts.verbose);
        assert_eq!(opts.config.cache_megs, 128.0);
    }

    #[test]
    fn rejects_unknown_flag() {
        assert!(parse_options(vec!["-bogus".to_string()]).is_err());
    }

    #[test]
    fn accumulates_repeated_hires_roots() {
        let opts = parse_options(vec!["-hires=/a".to_string(), "-hires=/b".to_string()]).unwrap();
        assert_eq!(opts.hires_roots, vec![PathBuf::from("/a"), PathBuf::from("/b")]);
    }
}
