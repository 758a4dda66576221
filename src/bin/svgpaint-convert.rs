use clap::crate_version;
use clap_complete::{Generator, Shell};

use cssparser::match_ignore_ascii_case;

use svgpaint::background;
use svgpaint::target::PT_PER_PX;
use svgpaint::{
    Document, LoadingError, Loader, Metadata, OutputSpec, OutputStream, RenderContext,
    RenderOptions, Renderer, RenderingError, Session, TargetKind,
};

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::io::IsTerminal;
use std::path::PathBuf;

#[derive(Debug)]
pub struct Error(String);

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! impl_error_from {
    ($err:ty) => {
        impl From<$err> for Error {
            fn from(e: $err) -> Self {
                Self(format!("{e}"))
            }
        }
    };
}

impl_error_from!(RenderingError);
impl_error_from!(LoadingError);
impl_error_from!(io::Error);
impl_error_from!(clap::Error);

macro_rules! error {
    ($($arg:tt)*) => (Error(std::format!($($arg)*)));
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum Format {
    Png,
    Pdf,
    Pdf1_7,
    Pdf1_6,
    Pdf1_5,
    Pdf1_4,
    Ps,
    Eps,
}

impl Format {
    fn is_vector(self) -> bool {
        self != Format::Png
    }

    fn target_kind(self) -> TargetKind {
        match self {
            Format::Png => TargetKind::Image(cairo::Format::ARgb32),
            Format::Ps | Format::Eps => TargetKind::Ps,
            _ => TargetKind::Pdf,
        }
    }

    fn pdf_version(self) -> cairo::PdfVersion {
        match self {
            Format::Pdf1_4 => cairo::PdfVersion::_1_4,
            Format::Pdf1_6 => cairo::PdfVersion::_1_6,
            Format::Pdf1_7 => cairo::PdfVersion::_1_7,
            _ => cairo::PdfVersion::_1_5,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Input {
    Stdin,
    Named(PathBuf),
}

impl fmt::Display for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Input::Stdin => write!(f, "stdin"),
            Input::Named(p) => write!(f, "{}", p.display()),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Output {
    Stdout,
    Spec(OutputSpec),
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Output::Stdout => write!(f, "stdout"),
            Output::Spec(OutputSpec::File(p)) => write!(f, "{}", p.display()),
            Output::Spec(OutputSpec::Pipe(command)) => write!(f, "pipe \"{command}\""),
            Output::Spec(OutputSpec::Printer(Some(name))) => write!(f, "printer {name}"),
            Output::Spec(OutputSpec::Printer(None)) => write!(f, "default printer"),
        }
    }
}

struct Converter {
    pub format: Format,
    pub ps_level: cairo::PsLevel,
    pub text_to_path: bool,
    pub omit_text: bool,
    pub metadata: Metadata,
    pub page_labels: Vec<String>,
    pub preview_dir: Option<PathBuf>,
    pub input: Vec<Input>,
    pub output: Output,
}

impl Converter {
    pub fn convert(self) -> Result<(), Error> {
        let session = Session::new();

        let mut ctx = RenderContext::with_session(session.clone(), self.render_options());

        match self.format.target_kind() {
            TargetKind::Image(format) => ctx.set_image_target(format)?,
            kind => {
                let stream = self.open_output()?;
                ctx.set_vector_target(kind, stream)?;
            }
        }

        for (page_idx, input) in self.input.iter().enumerate() {
            let document = self.load(input, &session)?;

            let (width, height) = document.size();
            if width <= 0.0 || height <= 0.0 {
                return Err(error!("The scene {} has no dimensions", input));
            }

            let label = self.page_labels.get(page_idx).map(String::as_str);

            if page_idx == 0 {
                self.setup_first_page(&mut ctx, &document, label)?;
            } else {
                ctx.finish_page()
                    .and_then(|_| ctx.next_page(width * PT_PER_PX, height * PT_PER_PX, label))
                    .map_err(|e| {
                        error!("Error setting page #{} for {}: {}", page_idx + 1, input, e)
                    })?;
            }

            Renderer::with_session(&document, session.clone())
                .and_then(|renderer| renderer.render(&mut ctx))
                .map_err(|e| error!("Error rendering scene {}: {}", input, e))?;

            if let Some(ref dir) = self.preview_dir {
                let path = dir.join(format!("page-{}.png", page_idx + 1));
                self.spawn_preview(&document, &session, path)
                    .map_err(|e| error!("Error rendering preview of {}: {}", input, e))?;
            }
        }

        match self.format {
            Format::Png => {
                self.write_png(&ctx)?;
                ctx.finish(true)?;
            }

            _ => ctx
                .finish(true)
                .map_err(|e| error!("Error saving output {}: {}", self.output, e))?,
        }

        Ok(())
    }

    fn render_options(&self) -> RenderOptions {
        RenderOptions {
            pdf_version: self.format.pdf_version(),
            ps_level: self.ps_level,
            eps: self.format == Format::Eps,
            text_to_path: self.text_to_path,
            omit_text: self.omit_text,
            filter_to_bitmap: self.format.is_vector(),
            ..Default::default()
        }
    }

    fn load(&self, input: &Input, session: &Session) -> Result<Document, Error> {
        let loader = Loader::new().with_session(session.clone());

        match input {
            Input::Stdin => {
                let stdin = io::stdin();
                if stdin.is_terminal() {
                    eprintln!("svgpaint-convert is reading from standard input.");
                    eprintln!("Type Control-C to exit if this is not what you expected.");
                }

                loader.read(stdin.lock())
            }

            Input::Named(p) => loader.read_path(p),
        }
        .map_err(|e| error!("Error reading scene {}: {}", input, e))
    }

    fn setup_first_page(
        &self,
        ctx: &mut RenderContext,
        document: &Document,
        label: Option<&str>,
    ) -> Result<(), Error> {
        let (width, height) = document.size();

        let result = if self.format.is_vector() {
            let creator = Metadata {
                creator: Some(format!("svgpaint-convert {}", crate_version!())),
                ..Default::default()
            };

            ctx.set_metadata(
                self.metadata
                    .clone()
                    .or(document.metadata().clone())
                    .or(creator),
            );

            ctx.setup_surface(width * PT_PER_PX, height * PT_PER_PX)
        } else {
            ctx.setup_surface(width, height)
        };

        result.map_err(|e| error!("Error creating output {}: {}", self.output, e))?;

        if let Some(label) = label {
            ctx.set_page_label(label)?;
        }

        Ok(())
    }

    fn open_output(&self) -> Result<OutputStream, Error> {
        match self.output {
            Output::Stdout => Ok(OutputStream::Writer(Box::new(io::stdout()))),
            Output::Spec(ref spec) => OutputStream::open(spec)
                .map_err(|e| error!("Error opening output {}: {}", self.output, e)),
        }
    }

    fn write_png(&self, ctx: &RenderContext) -> Result<(), Error> {
        match self.output {
            Output::Stdout => ctx.write_png(&mut io::stdout().lock()),
            Output::Spec(OutputSpec::File(ref p)) => ctx.save_as_png(p),
            _ => return Err(error!("PNG output can only be written to a file or stdout.")),
        }
        .map_err(|e| error!("Error saving output {}: {}", self.output, e))
    }

    // Cairo objects stay on this thread; only the encoded PNG is sent away.
    fn spawn_preview(
        &self,
        document: &Document,
        session: &Session,
        path: PathBuf,
    ) -> Result<(), RenderingError> {
        let (width, height) = document.size();

        let mut ctx = RenderContext::with_session(session.clone(), RenderOptions::default());
        ctx.set_image_target(cairo::Format::ARgb32)?;
        ctx.setup_surface(width, height)?;
        Renderer::with_session(document, session.clone())?.render(&mut ctx)?;

        let mut png = Vec::new();
        ctx.write_png(&mut png)?;
        ctx.finish(true)?;

        background::spawn(move || {
            if let Err(e) = std::fs::write(&path, png) {
                eprintln!("Error writing preview {}: {}", path.display(), e);
            }
        });

        Ok(())
    }
}

fn print_completions<G: Generator>(gen: G, cmd: &mut clap::Command) {
    clap_complete::generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
}

fn print_version() {
    println!("svgpaint-convert version {}\n", crate_version!());
    println!("libraries used:");
    println!("  cairo {}", cairo::version_string());
    println!("  pango {}", pango::version_string());
}

fn build_cli() -> clap::Command {
    let supported_formats = [
        "png", "pdf", "pdf1.7", "pdf1.6", "pdf1.5", "pdf1.4", "ps", "eps",
    ];

    clap::Command::new("svgpaint-convert")
        .version(concat!("version ", crate_version!()))
        .about("Render scene files to PNG, PDF or PostScript")
        .disable_version_flag(true)
        .arg(
            clap::Arg::new("version")
                .short('v')
                .long("version")
                .help("Display the version information")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("format")
                .short('f')
                .long("format")
                .num_args(1)
                .value_parser(clap::builder::PossibleValuesParser::new(supported_formats))
                .ignore_case(true)
                .default_value("png")
                .help("Output format")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("output")
                .short('o')
                .long("output")
                .num_args(1)
                .value_parser(clap::value_parser!(PathBuf))
                .value_name("filename")
                .help("Output filename [defaults to stdout]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("pipe")
                .long("pipe")
                .num_args(1)
                .value_parser(clap::builder::NonEmptyStringValueParser::new())
                .value_name("command")
                .conflicts_with_all(["output", "printer"])
                .help("Pipe PDF or PostScript output into a shell command")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("printer")
                .long("printer")
                .num_args(0..=1)
                .default_missing_value("")
                .value_name("name")
                .conflicts_with("output")
                .help("Send PDF or PostScript output to a printer [defaults to the default printer]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("ps_level")
                .long("ps-level")
                .num_args(1)
                .value_parser(clap::builder::PossibleValuesParser::new(["2", "3"]))
                .default_value("3")
                .help("PostScript language level")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("text_to_path")
                .long("text-to-path")
                .help("Convert text to paths")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("omit_text")
                .long("omit-text")
                .help("Leave text out of PDF pages and put it on pages of its own")
                .conflicts_with("text_to_path")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            clap::Arg::new("title")
                .long("title")
                .num_args(1)
                .value_name("text")
                .help("Document title [defaults to the scene's title]")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("author")
                .long("author")
                .num_args(1)
                .value_name("text")
                .help("Document author")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("subject")
                .long("subject")
                .num_args(1)
                .value_name("text")
                .help("Document subject")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("keywords")
                .long("keywords")
                .num_args(1)
                .value_name("text")
                .help("Document keywords")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("copyright")
                .long("copyright")
                .num_args(1)
                .value_name("text")
                .help("Copyright notice, for PostScript output")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("page_label")
                .long("page-label")
                .num_args(1)
                .value_name("label")
                .help("Label of the next page, in the order of the input files")
                .action(clap::ArgAction::Append),
        )
        .arg(
            clap::Arg::new("preview_dir")
                .long("preview-dir")
                .num_args(1)
                .value_parser(clap::value_parser!(PathBuf))
                .value_name("directory")
                .help("Also write a PNG preview of every page into a directory")
                .action(clap::ArgAction::Set),
        )
        .arg(
            clap::Arg::new("completion")
                .long("completion")
                .help("Output shell completion for the given shell")
                .num_args(1)
                .action(clap::ArgAction::Set)
                .value_parser(clap::value_parser!(Shell))
                .value_name("shell-name"),
        )
        .arg(
            clap::Arg::new("FILE")
                .value_parser(clap::value_parser!(OsString))
                .help("The scene file(s) to convert, you can use - for stdin")
                .num_args(1..)
                .action(clap::ArgAction::Append),
        )
}

fn parse_args() -> Result<Converter, Error> {
    let matches = build_cli().get_matches();

    if let Some(shell) = matches.get_one::<Shell>("completion").copied() {
        let mut cmd = build_cli();
        eprintln!("Generating completion file for {shell}");
        print_completions(shell, &mut cmd);
        std::process::exit(0);
    }

    if matches.get_flag("version") {
        print_version();
        std::process::exit(0);
    }

    converter_from_matches(&matches)
}

fn converter_from_matches(matches: &clap::ArgMatches) -> Result<Converter, Error> {
    let format_str: &String = matches
        .get_one("format")
        .expect("already provided default_value");

    let format = match_ignore_ascii_case! {
        format_str,
        "png" => Format::Png,
        "pdf" => Format::Pdf,
        "pdf1.7" => Format::Pdf1_7,
        "pdf1.6" => Format::Pdf1_6,
        "pdf1.5" => Format::Pdf1_5,
        "pdf1.4" => Format::Pdf1_4,
        "ps" => Format::Ps,
        "eps" => Format::Eps,
        _ => unreachable!("clap should already have the list of possible values"),
    };

    let ps_level = match matches
        .get_one::<String>("ps_level")
        .expect("already provided default_value")
        .as_str()
    {
        "2" => cairo::PsLevel::_2,
        _ => cairo::PsLevel::_3,
    };

    let input = match matches.get_many::<OsString>("FILE") {
        Some(values) => values
            .map(|f| {
                if f == "-" {
                    Input::Stdin
                } else {
                    Input::Named(PathBuf::from(f))
                }
            })
            .collect::<Vec<Input>>(),

        None => vec![Input::Stdin],
    };

    if input.iter().filter(|i| matches!(i, Input::Stdin)).count() > 1 {
        return Err(error!("Only one input file can be read from stdin."));
    }

    if input.len() > 1 && !format.is_vector() {
        return Err(error!(
            "Multiple scene files are only allowed for PDF and (E)PS output."
        ));
    }

    let output = if let Some(path) = matches.get_one::<PathBuf>("output") {
        Output::Spec(OutputSpec::File(path.clone()))
    } else if let Some(command) = matches.get_one::<String>("pipe") {
        Output::Spec(OutputSpec::Pipe(command.clone()))
    } else if let Some(name) = matches.get_one::<String>("printer") {
        let name = Some(name.clone()).filter(|n| !n.is_empty());
        Output::Spec(OutputSpec::Printer(name))
    } else {
        Output::Stdout
    };

    let is_process = matches!(
        output,
        Output::Spec(OutputSpec::Pipe(_) | OutputSpec::Printer(_))
    );

    if !format.is_vector() && is_process {
        return Err(error!("PNG output can only be written to a file or stdout."));
    }

    let text = |id: &str| matches.get_one::<String>(id).cloned();

    let metadata = Metadata {
        title: text("title"),
        author: text("author"),
        subject: text("subject"),
        keywords: text("keywords"),
        copyright: text("copyright"),
        ..Default::default()
    };

    let page_labels = matches
        .get_many::<String>("page_label")
        .map(|labels| labels.cloned().collect())
        .unwrap_or_default();

    Ok(Converter {
        format,
        ps_level,
        text_to_path: matches.get_flag("text_to_path"),
        omit_text: matches.get_flag("omit_text"),
        metadata,
        page_labels,
        preview_dir: matches.get_one::<PathBuf>("preview_dir").cloned(),
        input,
        output,
    })
}

fn main() {
    let result = parse_args().and_then(|converter| converter.convert());

    let panicked = background::join_all();

    if let Err(e) = result {
        std::eprintln!("{e}");
        std::process::exit(1);
    }

    if panicked > 0 {
        std::eprintln!("{panicked} preview task(s) failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn converter(args: &[&str]) -> Result<Converter, Error> {
        let matches = build_cli().try_get_matches_from(
            std::iter::once("svgpaint-convert").chain(args.iter().copied()),
        )?;
        converter_from_matches(&matches)
    }

    #[test]
    fn cli_is_consistent() {
        build_cli().debug_assert();
    }

    #[test]
    fn defaults_to_png_from_stdin_to_stdout() {
        let c = converter(&[]).unwrap();
        assert_eq!(c.format, Format::Png);
        assert_eq!(c.input, vec![Input::Stdin]);
        assert_eq!(c.output, Output::Stdout);
        assert!(c.page_labels.is_empty());
    }

    #[test]
    fn format_is_case_insensitive() {
        let c = converter(&["-f", "PDF1.4", "a.json"]).unwrap();
        assert_eq!(c.format, Format::Pdf1_4);
        assert_eq!(c.render_options().pdf_version, cairo::PdfVersion::_1_4);
    }

    #[test]
    fn eps_uses_the_ps_target() {
        let c = converter(&["-f", "eps", "--ps-level", "2", "a.json"]).unwrap();
        let options = c.render_options();
        assert_eq!(c.format.target_kind(), TargetKind::Ps);
        assert!(options.eps);
        assert_eq!(options.ps_level, cairo::PsLevel::_2);
    }

    #[test]
    fn multiple_inputs_need_a_vector_format() {
        assert!(converter(&["a.json", "b.json"]).is_err());

        let c = converter(&["-f", "pdf", "a.json", "b.json"]).unwrap();
        assert_eq!(c.input.len(), 2);
    }

    #[test]
    fn only_one_stdin() {
        assert!(converter(&["-f", "pdf", "-", "-"]).is_err());
    }

    #[test]
    fn output_destinations() {
        let c = converter(&["-f", "pdf", "--pipe", "cat > out.pdf", "a.json"]).unwrap();
        assert_eq!(
            c.output,
            Output::Spec(OutputSpec::Pipe(String::from("cat > out.pdf")))
        );

        let c = converter(&["-f", "ps", "--printer", "laser", "a.json"]).unwrap();
        assert_eq!(
            c.output,
            Output::Spec(OutputSpec::Printer(Some(String::from("laser"))))
        );

        let c = converter(&["-f", "ps", "a.json", "--printer"]).unwrap();
        assert_eq!(c.output, Output::Spec(OutputSpec::Printer(None)));
    }

    #[test]
    fn png_cannot_be_piped() {
        assert!(converter(&["--pipe", "cat", "a.json"]).is_err());
    }

    #[test]
    fn output_options_conflict() {
        assert!(converter(&["-f", "pdf", "-o", "x.pdf", "--pipe", "cat", "a.json"]).is_err());
    }

    #[test]
    fn metadata_and_labels() {
        let c = converter(&[
            "-f",
            "pdf",
            "--title",
            "Report",
            "--page-label",
            "i",
            "--page-label",
            "ii",
            "a.json",
            "b.json",
        ])
        .unwrap();

        assert_eq!(c.metadata.title.as_deref(), Some("Report"));
        assert_eq!(c.metadata.author, None);
        assert_eq!(c.page_labels, vec!["i", "ii"]);
    }

    #[test]
    fn text_modes_conflict() {
        assert!(converter(&["-f", "pdf", "--text-to-path", "--omit-text", "a.json"]).is_err());
    }
}
