use std::env;
use std::path::PathBuf;

use log::LevelFilter;
use moviebox_dl::AppConfig;
use moviebox_dl::cli::{self, CaptionMode, DownloadRequest, EpisodeRange, Quality};
use moviebox_dl::models::SubjectType;

enum Command {
    DownloadMovie(DownloadRequest),
    DownloadSeries(DownloadRequest, EpisodeRange),
    Search {
        keyword: String,
        subject_type: SubjectType,
        page: u32,
    },
    Homepage {
        title: Option<String>,
    },
    Popular,
    MirrorHosts,
}

struct CliArgs {
    command: Command,
    json: bool,
    verbose: u8,
    quiet: bool,
    debug: bool,
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {message}");
    eprintln!("Run 'moviebox --help' for usage.");
    std::process::exit(1);
}

fn value(args: &[String], i: &mut usize, flag: &str) -> String {
    *i += 1;
    args.get(*i)
        .cloned()
        .unwrap_or_else(|| fail(&format!("{flag} requires a value")))
}

fn number<T: std::str::FromStr>(args: &[String], i: &mut usize, flag: &str) -> T {
    let raw = value(args, i, flag);
    raw.parse()
        .unwrap_or_else(|_| fail(&format!("{flag} expects a number, got '{raw}'")))
}

fn parse_subject_type(raw: &str) -> SubjectType {
    match raw.to_ascii_lowercase().as_str() {
        "all" => SubjectType::All,
        "movies" | "movie" => SubjectType::Movies,
        "series" | "tv" | "tv-series" | "tv_series" => SubjectType::TvSeries,
        "music" => SubjectType::Music,
        other => fail(&format!("unknown subject type '{other}'")),
    }
}

#[allow(clippy::too_many_lines)]
fn parse_args() -> CliArgs {
    let args: Vec<String> = env::args().skip(1).collect();
    let Some(name) = args.first() else {
        print_usage();
        std::process::exit(1);
    };
    if name == "-h" || name == "--help" {
        print_usage();
        std::process::exit(0);
    }

    let mut positional: Vec<String> = Vec::new();
    let mut request = DownloadRequest::new(String::new());
    let mut caption = true;
    let mut caption_only = false;
    let mut range = EpisodeRange {
        season: 1,
        episode: 1,
        limit: 1,
    };
    let mut subject_type = SubjectType::All;
    let mut page = 1;
    let mut title = None;
    let mut json = false;
    let mut verbose = 0;
    let mut debug = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "-q" | "--quality" => {
                let raw = value(&args, &mut i, "--quality");
                request.quality = raw.parse::<Quality>().unwrap_or_else(|e| fail(&e));
            }
            "-d" | "--dir" => request.directory = Some(PathBuf::from(value(&args, &mut i, "--dir"))),
            "-x" | "--language" => request.language = value(&args, &mut i, "--language"),
            "--caption" => caption = true,
            "--no-caption" => caption = false,
            "--caption-only" => caption_only = true,
            "-y" | "--yes" => request.yes = true,
            "-Y" | "--year" => request.year = Some(number(&args, &mut i, "--year")),
            "-s" | "--season" => range.season = number(&args, &mut i, "--season"),
            "-e" | "--episode" => range.episode = number(&args, &mut i, "--episode"),
            "-l" | "--limit" => range.limit = number(&args, &mut i, "--limit"),
            "-t" | "--type" => subject_type = parse_subject_type(&value(&args, &mut i, "--type")),
            "-p" | "--page" => page = number(&args, &mut i, "--page"),
            "--title" => title = Some(value(&args, &mut i, "--title")),
            "-r" | "--resume" => request.resume = true,
            "--quiet" => request.quiet = true,
            "-v" | "--verbose" => verbose += 1,
            "--debug" => debug = true,
            "-j" | "--json" => json = true,
            "-h" | "--help" => {
                print_usage();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => positional.push(arg.to_string()),
            other => fail(&format!("unknown option '{other}'")),
        }
        i += 1;
    }

    request.caption_mode = match (caption_only, caption) {
        (true, _) => CaptionMode::Only,
        (false, true) => CaptionMode::Include,
        (false, false) => CaptionMode::Skip,
    };
    let quiet = request.quiet;
    let keyword = positional.join(" ");

    let command = match name.as_str() {
        "download-movie" | "movie" => {
            if keyword.is_empty() {
                fail("download-movie needs a title");
            }
            request.title = keyword;
            Command::DownloadMovie(request)
        }
        "download-series" | "series" => {
            if keyword.is_empty() {
                fail("download-series needs a title");
            }
            if range.limit == 0 {
                fail("--limit must be at least 1");
            }
            request.title = keyword;
            Command::DownloadSeries(request, range)
        }
        "search" => {
            if keyword.is_empty() {
                fail("search needs a keyword");
            }
            Command::Search {
                keyword,
                subject_type,
                page,
            }
        }
        "homepage" => Command::Homepage { title },
        "popular" => Command::Popular,
        "mirror-hosts" => Command::MirrorHosts,
        other => fail(&format!("unknown command '{other}'")),
    };

    CliArgs {
        command,
        json,
        verbose,
        quiet,
        debug,
    }
}

fn print_usage() {
    eprintln!("Usage: moviebox <COMMAND> [OPTIONS] [TITLE|KEYWORD]...");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  download-movie <title>    Search for a movie and download it");
    eprintln!("  download-series <title>   Search for a series and download episodes");
    eprintln!("  search <keyword>          Show one page of search results");
    eprintln!("  homepage                  Show the homepage listings");
    eprintln!("  popular                   Show what everyone is searching for");
    eprintln!("  mirror-hosts              List the known mirror hosts");
    eprintln!();
    eprintln!("Download options:");
    eprintln!("  -q, --quality <Q>         best, worst, 360, 480, 720 or 1080 (default: best)");
    eprintln!("  -d, --dir <DIR>           Download directory (default: from config)");
    eprintln!("  -x, --language <LANG>     Caption language name or code (default: English)");
    eprintln!("      --caption             Download the caption track too (default)");
    eprintln!("      --no-caption          Skip the caption track");
    eprintln!("      --caption-only        Download the caption track only");
    eprintln!("  -Y, --year <YEAR>         Only consider items released that year");
    eprintln!("  -y, --yes                 Take the first match without asking");
    eprintln!("  -s, --season <N>          Season to download (default: 1)");
    eprintln!("  -e, --episode <N>         First episode to download (default: 1)");
    eprintln!("  -l, --limit <N>           Number of episodes (default: 1)");
    eprintln!("  -r, --resume              Continue partially downloaded files");
    eprintln!();
    eprintln!("Listing options:");
    eprintln!("  -t, --type <TYPE>         all, movies, series or music (search only)");
    eprintln!("  -p, --page <N>            Results page (search only, default: 1)");
    eprintln!("      --title <TEXT>        Only homepage categories whose title contains TEXT");
    eprintln!("  -j, --json                Print JSON instead of tables");
    eprintln!();
    eprintln!("General options:");
    eprintln!("      --quiet               No progress output, errors only");
    eprintln!("  -v, --verbose             More logging (repeat for debug)");
    eprintln!("      --debug               Show full error details");
    eprintln!("  -h, --help                Show this help");
    eprintln!();
    eprintln!("Environment:");
    eprintln!("  MOVIEBOX_API_HOST         Mirror host to use instead of the configured one");
    eprintln!("  RUST_LOG                  Log filter, overrides -v and --quiet");
}

fn init_logger(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Warn,
        (false, 1) => LevelFilter::Info,
        (false, _) => LevelFilter::Debug,
    };
    let mut builder = env_logger::Builder::new();
    builder
        .format_timestamp_millis()
        .filter_level(level)
        .filter_module("reqwest", LevelFilter::Warn)
        .filter_module("hyper", LevelFilter::Warn)
        .filter_module("hyper_util", LevelFilter::Warn);
    if let Ok(filters) = env::var("RUST_LOG") {
        builder.parse_filters(&filters);
    }
    builder.init();
}

async fn run(args: CliArgs) -> moviebox_dl::Result<()> {
    let config = AppConfig::load()?;
    log::debug!("Using host {}", config.client.host);
    match args.command {
        Command::DownloadMovie(request) => cli::download_movie(&config, &request).await.map(drop),
        Command::DownloadSeries(request, range) => {
            cli::download_series(&config, &request, range).await.map(drop)
        }
        Command::Search {
            keyword,
            subject_type,
            page,
        } => cli::search(&config, &keyword, subject_type, page, args.json).await,
        Command::Homepage { title } => cli::homepage(&config, title.as_deref(), args.json).await,
        Command::Popular => cli::popular(&config, args.json).await,
        Command::MirrorHosts => cli::mirror_hosts(&config, args.json),
    }
}

#[tokio::main]
async fn main() {
    let args = parse_args();
    init_logger(args.verbose, args.quiet);
    let debug = args.debug;

    if let Err(e) = run(args).await {
        if debug {
            eprintln!("Error: {e:?}");
        } else {
            eprintln!("Error: {e}");
        }
        std::process::exit(1);
    }
}
