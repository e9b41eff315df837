//! Book assembly and EPUB 3 output (mimetype, container, OPF, nav, optional NCX, cover, chapters).
//!
//! A [`Book`] collects chapters in call order and an optional cover; [`Book::write`]
//! produces the whole archive in one go. The archive is built in a temporary file
//! beside the target and renamed into place, so a failed write leaves nothing behind.

use crate::model::slugify;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

const CONTAINER_XML: &[u8] = b"<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<container version=\"1.0\" xmlns=\"urn:oasis:names:tc:opendocument:xmlns:container\">\n  <rootfiles>\n    <rootfile full-path=\"OEBPS/content.opf\" media-type=\"application/oebps-package+xml\"/>\n  </rootfiles>\n</container>";

const MIMETYPE: &[u8] = b"application/epub+zip";
const OEBPS_PREFIX: &str = "OEBPS/";

/// File stems the package itself uses; chapters never get these.
const RESERVED_STEMS: &[&str] = &["nav", "cover", "toc", "title"];

/// Output switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EpubOptions {
    /// Also write toc.ncx for EPUB 2 era readers.
    pub ncx: bool,
    /// Insert a visible table-of-contents page after the cover.
    pub toc_page: bool,
}

impl Default for EpubOptions {
    fn default() -> Self {
        Self {
            ncx: true,
            toc_page: false,
        }
    }
}

/// Registering a resource with the book failed.
#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("Cannot read cover image {path}: {source}")]
    ReadImage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Unsupported cover image type: {path}. Use jpg, png, gif, webp or svg.")]
    UnsupportedImage { path: PathBuf },

    #[error("Cannot read stylesheet {path}: {source}")]
    ReadStylesheet {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stylesheet name {name:?} is already in use.")]
    DuplicateStylesheet { name: String },

    #[error("Cannot create temporary cover stylesheet: {source}")]
    Scratch {
        #[source]
        source: std::io::Error,
    },
}

/// Writing the archive failed. Nothing is left at the target path.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("Cannot write EPUB: book title is empty.")]
    EmptyTitle,

    #[error("Cannot write EPUB: book author is empty.")]
    EmptyAuthor,

    #[error("Failed to create EPUB file: {path}: {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write EPUB archive: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Cannot move finished EPUB into place: {path}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<std::io::Error> for WriteError {
    fn from(e: std::io::Error) -> Self {
        WriteError::Zip(zip::result::ZipError::Io(e))
    }
}

/// One chapter in reading order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chapter {
    pub title: String,
    /// As given by the caller; may repeat across chapters.
    pub slug: String,
    /// Archive file name under OEBPS/, unique within the book.
    pub file_name: String,
    pub content: String,
    /// Href of an extra stylesheet linked from this chapter.
    pub css: Option<String>,
}

#[derive(Debug, Clone)]
struct Resource {
    href: String,
    media_type: &'static str,
    data: Vec<u8>,
}

#[derive(Debug, Clone)]
struct Cover {
    image: Resource,
    css_href: String,
}

/// A book under construction. Chapters are only ever appended.
#[derive(Debug, Clone)]
pub struct Book {
    title: String,
    author: String,
    identifier: String,
    language: String,
    chapters: Vec<Chapter>,
    cover: Option<Cover>,
    stylesheets: Vec<Resource>,
    used_stems: HashSet<String>,
}

impl Book {
    pub fn new(title: impl Into<String>, author: impl Into<String>) -> Self {
        let title = title.into();
        let identifier = format!("urn:epublifier:{}", file_stem(&slugify(&title)));
        Self {
            title,
            author: author.into(),
            identifier,
            language: "en".to_string(),
            chapters: Vec::new(),
            cover: None,
            stylesheets: Vec::new(),
            used_stems: RESERVED_STEMS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = language.into();
    }

    pub fn set_identifier(&mut self, identifier: impl Into<String>) {
        self.identifier = identifier.into();
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn chapters(&self) -> &[Chapter] {
        &self.chapters
    }

    pub fn has_cover(&self) -> bool {
        self.cover.is_some()
    }

    /// Append a chapter. Returns the archive file name it was given: the slug made
    /// file-safe, with `-2`, `-3`, ... appended when an earlier chapter already took it.
    pub fn add_chapter(
        &mut self,
        content: impl Into<String>,
        title: impl Into<String>,
        slug: impl Into<String>,
        custom_css: Option<&str>,
    ) -> String {
        let slug = slug.into();
        let base = file_stem(&slug);
        let mut stem = base.clone();
        let mut n = 2;
        while self.used_stems.contains(&stem) {
            stem = format!("{}-{}", base, n);
            n += 1;
        }
        self.used_stems.insert(stem.clone());
        let file_name = format!("{}.xhtml", stem);
        self.chapters.push(Chapter {
            title: title.into(),
            slug,
            file_name: file_name.clone(),
            content: content.into(),
            css: custom_css.map(String::from),
        });
        file_name
    }

    /// Register a stylesheet under `css/<name>` and return its href.
    pub fn add_stylesheet(&mut self, path: &Path, name: &str) -> Result<String, AssemblyError> {
        let href = format!("css/{}", name);
        if self.stylesheets.iter().any(|s| s.href == href) {
            return Err(AssemblyError::DuplicateStylesheet {
                name: name.to_string(),
            });
        }
        let data = std::fs::read(path).map_err(|e| AssemblyError::ReadStylesheet {
            path: path.to_path_buf(),
            source: e,
        })?;
        self.stylesheets.push(Resource {
            href: href.clone(),
            media_type: "text/css",
            data,
        });
        Ok(href)
    }

    /// Register the cover image as `images/cover.<ext>` and its page stylesheet as `css/cover.css`.
    ///
    /// Both files are read now; they are not needed afterwards.
    pub fn set_cover(&mut self, image_path: &Path, css_path: &Path) -> Result<(), AssemblyError> {
        let ext = image_path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        let media_type =
            image_media_type(&ext).ok_or_else(|| AssemblyError::UnsupportedImage {
                path: image_path.to_path_buf(),
            })?;
        let data = std::fs::read(image_path).map_err(|e| AssemblyError::ReadImage {
            path: image_path.to_path_buf(),
            source: e,
        })?;
        let css_href = self.add_stylesheet(css_path, "cover.css")?;
        self.cover = Some(Cover {
            image: Resource {
                href: format!("images/cover.{}", ext),
                media_type,
                data,
            },
            css_href,
        });
        Ok(())
    }

    /// Write the EPUB to `path`, replacing any file already there only on success.
    pub fn write(&self, path: &Path, options: EpubOptions) -> Result<(), WriteError> {
        if self.title.trim().is_empty() {
            return Err(WriteError::EmptyTitle);
        }
        if self.author.trim().is_empty() {
            return Err(WriteError::EmptyAuthor);
        }

        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        let tmp = tempfile::Builder::new()
            .prefix(".epublifier-")
            .suffix(".part")
            .tempfile_in(dir)
            .map_err(|e| WriteError::CreateFile {
                path: path.to_path_buf(),
                source: e,
            })?;

        self.write_archive(tmp.as_file(), options)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            tmp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))?;
        }
        tmp.persist(path).map_err(|e| WriteError::Persist {
            path: path.to_path_buf(),
            source: e.error,
        })?;
        tracing::info!(path = %path.display(), chapters = self.chapters.len(), "wrote EPUB");
        Ok(())
    }

    fn write_archive(&self, file: &std::fs::File, options: EpubOptions) -> Result<(), WriteError> {
        let mut zip = ZipWriter::new(file);
        let stored = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Stored)
            .unix_permissions(0o644);
        let deflate = SimpleFileOptions::default()
            .compression_method(zip::CompressionMethod::Deflated)
            .unix_permissions(0o644);

        // Mimetype first and uncompressed, as OCF requires.
        zip.start_file("mimetype", stored)?;
        zip.write_all(MIMETYPE)?;
        zip.start_file("META-INF/container.xml", deflate)?;
        zip.write_all(CONTAINER_XML)?;

        let put = |zip: &mut ZipWriter<&std::fs::File>, name: &str, data: &[u8]| {
            zip.start_file(format!("{}{}", OEBPS_PREFIX, name), deflate)?;
            zip.write_all(data)?;
            Ok::<(), WriteError>(())
        };

        put(&mut zip, "content.opf", self.opf(options).as_bytes())?;
        put(&mut zip, "nav.xhtml", self.nav_xhtml().as_bytes())?;
        if options.ncx {
            put(&mut zip, "toc.ncx", self.ncx().as_bytes())?;
        }
        if let Some(cover) = &self.cover {
            put(&mut zip, "cover.xhtml", cover_xhtml(cover).as_bytes())?;
            put(&mut zip, &cover.image.href, &cover.image.data)?;
        }
        if self.needs_title_page() {
            put(&mut zip, "title.xhtml", self.title_xhtml().as_bytes())?;
        }
        if options.toc_page {
            put(&mut zip, "toc.xhtml", self.toc_page_xhtml().as_bytes())?;
        }
        for sheet in &self.stylesheets {
            put(&mut zip, &sheet.href, &sheet.data)?;
        }
        for ch in &self.chapters {
            put(&mut zip, &ch.file_name, chapter_xhtml(ch).as_bytes())?;
        }
        zip.finish()?;
        Ok(())
    }

    /// The spine may not be empty; a book with no chapters and no cover gets a title page.
    fn needs_title_page(&self) -> bool {
        self.chapters.is_empty() && self.cover.is_none()
    }

    fn opf(&self, options: EpubOptions) -> String {
        let mut manifest = String::from(
            "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
        );
        let mut spine = String::new();
        if options.ncx {
            manifest.push_str(
                "    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n",
            );
        }
        let mut cover_meta = String::new();
        if let Some(cover) = &self.cover {
            manifest.push_str(&format!(
                "    <item id=\"cover-img\" href=\"{}\" media-type=\"{}\" properties=\"cover-image\"/>\n",
                xml_escape(&cover.image.href),
                cover.image.media_type
            ));
            manifest.push_str(
                "    <item id=\"cover\" href=\"cover.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            );
            spine.push_str("    <itemref idref=\"cover\"/>\n");
            cover_meta.push_str("    <meta name=\"cover\" content=\"cover-img\"/>\n");
        }
        if self.needs_title_page() {
            manifest.push_str(
                "    <item id=\"title-page\" href=\"title.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            );
            spine.push_str("    <itemref idref=\"title-page\"/>\n");
        }
        if options.toc_page {
            manifest.push_str(
                "    <item id=\"toc-page\" href=\"toc.xhtml\" media-type=\"application/xhtml+xml\"/>\n",
            );
            spine.push_str("    <itemref idref=\"toc-page\"/>\n");
        }
        for (i, sheet) in self.stylesheets.iter().enumerate() {
            manifest.push_str(&format!(
                "    <item id=\"css-{}\" href=\"{}\" media-type=\"{}\"/>\n",
                i + 1,
                xml_escape(&sheet.href),
                sheet.media_type
            ));
        }
        for (i, ch) in self.chapters.iter().enumerate() {
            manifest.push_str(&format!(
                "    <item id=\"chapter-{}\" href=\"{}\" media-type=\"application/xhtml+xml\"/>\n",
                i + 1,
                xml_escape(&ch.file_name)
            ));
            spine.push_str(&format!("    <itemref idref=\"chapter-{}\"/>\n", i + 1));
        }

        let modified = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
        let spine_attr = if options.ncx { " toc=\"ncx\"" } else { "" };
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" unique-identifier="book-id" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>{creator}</dc:creator>
    <dc:language>{language}</dc:language>
    <meta property="dcterms:modified">{modified}</meta>
{cover_meta}  </metadata>
  <manifest>
{manifest}  </manifest>
  <spine{spine_attr}>
{spine}  </spine>
</package>
"#,
            id = xml_escape(&self.identifier),
            title = xml_escape(&self.title),
            creator = xml_escape(&self.author),
            language = xml_escape(&self.language),
        )
    }

    /// (href, label) pairs for navigation documents. Falls back to the title page.
    fn nav_entries(&self) -> Vec<(&str, &str)> {
        if self.chapters.is_empty() {
            let target = if self.cover.is_some() {
                "cover.xhtml"
            } else {
                "title.xhtml"
            };
            return vec![(target, self.title.as_str())];
        }
        self.chapters
            .iter()
            .map(|ch| (ch.file_name.as_str(), ch.title.as_str()))
            .collect()
    }

    fn nav_list(&self) -> String {
        self.nav_entries()
            .into_iter()
            .map(|(href, label)| {
                format!(
                    "      <li><a href=\"{}\">{}</a></li>\n",
                    xml_escape(href),
                    xml_escape(label)
                )
            })
            .collect()
    }

    fn nav_xhtml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>Table of Contents</title>
</head>
<body>
  <nav epub:type="toc">
    <h1>Contents</h1>
    <ol>
{}    </ol>
  </nav>
</body>
</html>
"#,
            self.nav_list()
        )
    }

    fn toc_page_xhtml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>Table of Contents</title>
</head>
<body>
  <h1>Table of Contents</h1>
  <ol>
{}  </ol>
</body>
</html>
"#,
            self.nav_list()
        )
    }

    fn title_xhtml(&self) -> String {
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>{title}</title>
</head>
<body>
  <h1>{title}</h1>
  <p>{author}</p>
</body>
</html>
"#,
            title = xml_escape(&self.title),
            author = xml_escape(&self.author)
        )
    }

    fn ncx(&self) -> String {
        let mut nav_points = String::new();
        for (i, (href, label)) in self.nav_entries().into_iter().enumerate() {
            nav_points.push_str(&format!(
                r#"    <navPoint id="navpoint-{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="{href}"/>
    </navPoint>
"#,
                n = i + 1,
                label = xml_escape(label),
                href = xml_escape(href)
            ));
        }
        format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="{}"/>
  </head>
  <docTitle>
    <text>{}</text>
  </docTitle>
  <navMap>
{}  </navMap>
</ncx>
"#,
            xml_escape(&self.identifier),
            xml_escape(&self.title),
            nav_points
        )
    }
}

fn cover_xhtml(cover: &Cover) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml">
<head>
  <meta charset="UTF-8"/>
  <title>Cover</title>
  <link rel="stylesheet" type="text/css" href="{}"/>
</head>
<body>
  <img src="{}" alt="Cover Image"/>
</body>
</html>
"#,
        xml_escape(&cover.css_href),
        xml_escape(&cover.image.href)
    )
}

fn chapter_xhtml(ch: &Chapter) -> String {
    let css = ch
        .css
        .as_deref()
        .map(|href| {
            format!(
                "\n  <link rel=\"stylesheet\" type=\"text/css\" href=\"{}\"/>",
                xml_escape(href)
            )
        })
        .unwrap_or_default();
    let trimmed = ch.content.trim();
    let body = if trimmed.starts_with("<body") && trimmed.ends_with("</body>") {
        trimmed.to_string()
    } else {
        format!("<body>\n{}\n</body>", trimmed)
    };
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops">
<head>
  <meta charset="UTF-8"/>
  <title>{}</title>{}
</head>
{}
</html>
"#,
        xml_escape(&ch.title),
        css,
        body
    )
}

/// Archive-safe file stem: ASCII letters, digits, `-`, `_` and `.` are kept, anything else becomes `_`.
fn file_stem(slug: &str) -> String {
    let stem: String = slug
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let stem = stem.trim_matches('.').to_string();
    if stem.is_empty() {
        "section".to_string()
    } else {
        stem
    }
}

fn image_media_type(ext: &str) -> Option<&'static str> {
    match ext {
        "jpg" | "jpeg" => Some("image/jpeg"),
        "png" => Some("image/png"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "svg" => Some("image/svg+xml"),
        _ => None,
    }
}

fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use zip::read::ZipArchive;

    fn read_entry(zip: &mut ZipArchive<std::fs::File>, name: &str) -> String {
        let mut entry = zip.by_name(name).unwrap();
        let mut s = String::new();
        entry.read_to_string(&mut s).unwrap();
        s
    }

    fn open(path: &Path) -> ZipArchive<std::fs::File> {
        ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap()
    }

    fn minimal_book() -> Book {
        let mut book = Book::new("Test Book", "Test Author");
        book.add_chapter(
            "<body><p>First paragraph.</p></body>",
            "Chapter 1",
            "chapter-1",
            None,
        );
        book
    }

    #[test]
    fn write_rejects_empty_title_and_author() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("void.epub");
        let book = Book::new(" ", "A");
        assert!(matches!(
            book.write(&path, EpubOptions::default()),
            Err(WriteError::EmptyTitle)
        ));
        let book = Book::new("T", "");
        assert!(matches!(
            book.write(&path, EpubOptions::default()),
            Err(WriteError::EmptyAuthor)
        ));
        assert!(!path.exists());
    }

    #[test]
    fn writes_epub3_package() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        minimal_book().write(&path, EpubOptions::default()).unwrap();
        let mut zip = open(&path);
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        for expected in [
            "mimetype",
            "META-INF/container.xml",
            "OEBPS/content.opf",
            "OEBPS/nav.xhtml",
            "OEBPS/toc.ncx",
            "OEBPS/chapter-1.xhtml",
        ] {
            assert!(names.iter().any(|n| n == expected), "missing {}", expected);
        }
        {
            let first = zip.by_index(0).unwrap();
            assert_eq!(first.name(), "mimetype");
            assert_eq!(first.compression(), zip::CompressionMethod::Stored);
        }
        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        assert!(opf.contains("version=\"3.0\""));
        assert!(opf.contains("<dc:title>Test Book</dc:title>"));
        assert!(opf.contains("<dc:creator>Test Author</dc:creator>"));
        assert!(opf.contains("dcterms:modified"));
        let chapter = read_entry(&mut zip, "OEBPS/chapter-1.xhtml");
        assert!(chapter.contains("<title>Chapter 1</title>"));
        assert!(chapter.contains("<body><p>First paragraph.</p></body>"));
        assert_eq!(chapter.matches("<body").count(), 1);
    }

    #[test]
    fn options_toggle_ncx_and_toc_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        let options = EpubOptions {
            ncx: false,
            toc_page: true,
        };
        minimal_book().write(&path, options).unwrap();
        let mut zip = open(&path);
        let names: Vec<String> = zip.file_names().map(String::from).collect();
        assert!(!names.iter().any(|n| n == "OEBPS/toc.ncx"));
        assert!(names.iter().any(|n| n == "OEBPS/toc.xhtml"));
        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        assert!(opf.contains("toc-page"));
        assert!(!opf.contains("toc=\"ncx\""));
    }

    #[test]
    fn chapters_keep_call_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ordered.epub");
        let mut book = Book::new("Ordered", "Me");
        for title in ["Zeta", "Alpha", "Mu"] {
            book.add_chapter(format!("<p>{}</p>", title), title, slugify(title), None);
        }
        book.write(&path, EpubOptions::default()).unwrap();
        let mut zip = open(&path);
        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        let zeta = opf.find("href=\"zeta.xhtml\"").unwrap();
        let alpha = opf.find("href=\"alpha.xhtml\"").unwrap();
        let mu = opf.find("href=\"mu.xhtml\"").unwrap();
        assert!(zeta < alpha && alpha < mu);
        let chapter = read_entry(&mut zip, "OEBPS/alpha.xhtml");
        assert!(chapter.contains("<body>\n<p>Alpha</p>\n</body>"));
    }

    #[test]
    fn duplicate_slugs_get_ordinal_suffixes() {
        let mut book = Book::new("Dupes", "Me");
        let a = book.add_chapter("<p>1</p>", "Prologue", "prologue", None);
        let b = book.add_chapter("<p>2</p>", "Prologue", "prologue", None);
        let c = book.add_chapter("<p>3</p>", "Prologue", "prologue", None);
        assert_eq!(a, "prologue.xhtml");
        assert_eq!(b, "prologue-2.xhtml");
        assert_eq!(c, "prologue-3.xhtml");
        assert!(book.chapters().iter().all(|ch| ch.slug == "prologue"));
    }

    #[test]
    fn file_names_are_archive_safe_and_avoid_reserved() {
        let mut book = Book::new("Safe", "Me");
        assert_eq!(
            book.add_chapter("", "Chapter One: The Beginning", "chapter-one:-the-beginning", None),
            "chapter-one_-the-beginning.xhtml"
        );
        assert_eq!(book.add_chapter("", "Nav", "nav", None), "nav-2.xhtml");
        assert_eq!(book.add_chapter("", "", "", None), "section.xhtml");
        assert_eq!(book.add_chapter("", "日本", "日本", None), "__.xhtml");
    }

    #[test]
    fn empty_book_gets_title_page() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.epub");
        Book::new("Nothing <Yet>", "Nobody")
            .write(&path, EpubOptions::default())
            .unwrap();
        let mut zip = open(&path);
        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        assert!(opf.contains("<itemref idref=\"title-page\"/>"));
        assert!(!opf.contains("chapter-"));
        let title = read_entry(&mut zip, "OEBPS/title.xhtml");
        assert!(title.contains("Nothing &lt;Yet&gt;"));
        let nav = read_entry(&mut zip, "OEBPS/nav.xhtml");
        assert!(nav.contains("href=\"title.xhtml\""));
    }

    #[test]
    fn cover_registers_image_and_stylesheet() {
        let dir = tempfile::tempdir().unwrap();
        let image = dir.path().join("art.WEBP");
        let css = dir.path().join("c.css");
        std::fs::write(&image, b"RIFF....WEBP").unwrap();
        std::fs::write(&css, b"img { max-width: 100%; }").unwrap();
        let mut book = minimal_book();
        book.set_cover(&image, &css).unwrap();
        assert!(book.has_cover());

        let path = dir.path().join("covered.epub");
        book.write(&path, EpubOptions::default()).unwrap();
        let mut zip = open(&path);
        let opf = read_entry(&mut zip, "OEBPS/content.opf");
        assert!(opf.contains("href=\"images/cover.webp\" media-type=\"image/webp\" properties=\"cover-image\""));
        assert!(opf.contains("<itemref idref=\"cover\"/>"));
        assert!(opf.contains("href=\"css/cover.css\""));
        let page = read_entry(&mut zip, "OEBPS/cover.xhtml");
        assert!(page.contains("href=\"css/cover.css\""));
        assert!(page.contains("src=\"images/cover.webp\""));
        assert_eq!(
            read_entry(&mut zip, "OEBPS/css/cover.css"),
            "img { max-width: 100%; }"
        );
    }

    #[test]
    fn cover_failures_are_assembly_errors() {
        let dir = tempfile::tempdir().unwrap();
        let css = dir.path().join("c.css");
        std::fs::write(&css, b"").unwrap();
        let mut book = minimal_book();
        assert!(matches!(
            book.set_cover(&dir.path().join("missing.png"), &css),
            Err(AssemblyError::ReadImage { .. })
        ));
        let bmp = dir.path().join("cover.bmp");
        std::fs::write(&bmp, b"BM").unwrap();
        assert!(matches!(
            book.set_cover(&bmp, &css),
            Err(AssemblyError::UnsupportedImage { .. })
        ));
        let png = dir.path().join("cover.png");
        std::fs::write(&png, b"\x89PNG").unwrap();
        assert!(matches!(
            book.set_cover(&png, &dir.path().join("missing.css")),
            Err(AssemblyError::ReadStylesheet { .. })
        ));
        assert!(!book.has_cover());
    }

    #[test]
    fn chapter_links_custom_stylesheet() {
        let dir = tempfile::tempdir().unwrap();
        let css = dir.path().join("reader.css");
        std::fs::write(&css, b"p { text-indent: 1em; }").unwrap();
        let mut book = Book::new("Styled", "Me");
        let href = book.add_stylesheet(&css, "reader.css").unwrap();
        assert!(matches!(
            book.add_stylesheet(&css, "reader.css"),
            Err(AssemblyError::DuplicateStylesheet { .. })
        ));
        book.add_chapter("<p>x</p>", "One", "one", Some(&href));
        let path = dir.path().join("styled.epub");
        book.write(&path, EpubOptions::default()).unwrap();
        let mut zip = open(&path);
        let chapter = read_entry(&mut zip, "OEBPS/one.xhtml");
        assert!(chapter.contains("href=\"css/reader.css\""));
    }

    #[test]
    fn failed_write_leaves_no_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("book.epub");
        let result = minimal_book().write(&path, EpubOptions::default());
        assert!(matches!(result, Err(WriteError::CreateFile { .. })));
        assert!(!path.exists());
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn overwrite_replaces_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("book.epub");
        std::fs::write(&path, b"old").unwrap();
        minimal_book().write(&path, EpubOptions::default()).unwrap();
        assert!(ZipArchive::new(std::fs::File::open(&path).unwrap()).is_ok());
        let leftovers = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
            .count();
        assert_eq!(leftovers, 0);
    }

    /// Parses `xml` with a strict XML reader: balanced, matching tags, a single
    /// root, unique attributes, and only resolvable entity references.
    fn assert_well_formed(name: &str, xml: &str) {
        use quick_xml::events::Event;
        use quick_xml::Reader;

        let mut reader = Reader::from_str(xml);
        let mut depth = 0usize;
        let mut roots = 0usize;
        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if depth == 0 {
                        roots += 1;
                    }
                    depth += 1;
                    for attr in e.attributes() {
                        let attr = attr.unwrap_or_else(|err| panic!("{}: bad attribute: {}", name, err));
                        attr.unescape_value()
                            .unwrap_or_else(|err| panic!("{}: bad attribute value: {}", name, err));
                    }
                }
                Ok(Event::Empty(e)) => {
                    if depth == 0 {
                        roots += 1;
                    }
                    for attr in e.attributes() {
                        let attr = attr.unwrap_or_else(|err| panic!("{}: bad attribute: {}", name, err));
                        attr.unescape_value()
                            .unwrap_or_else(|err| panic!("{}: bad attribute value: {}", name, err));
                    }
                }
                Ok(Event::End(_)) => {
                    assert!(depth > 0, "{}: unbalanced end tag", name);
                    depth -= 1;
                }
                Ok(Event::Text(t)) => {
                    t.unescape()
                        .unwrap_or_else(|err| panic!("{}: bad text: {}", name, err));
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => panic!("{}: not well-formed at {}: {}", name, reader.buffer_position(), err),
            }
        }
        assert_eq!(depth, 0, "{}: unclosed elements", name);
        assert_eq!(roots, 1, "{}: expected one root element", name);
    }

    #[test]
    fn chapters_are_well_formed_xml() {
        use crate::model::ExtractedArticle;
        use crate::sanitize::{DefaultSanitizer, Sanitizer};

        let markup = r#"<html><head><title>x</title></head><body>
            <p title='say "hi"' x:y="2" data-a="1&amp;2">a &amp; b &lt; c<br>d&nbsp;e</p>
            <script>if (a < b && c) { x = "]]>"; }</script>
            <noscript><img src="a.png"></noscript>
            <style>p > a { color: red }</style>
            <!-- a -- b --->
            <pre>  ]]&gt; kept  </pre>
            <dialog>overlay</dialog><div>overlay body</div>
            <table><tr><td>1</td></tr></table>
            </body></html>"#;
        let article = ExtractedArticle {
            title: "Tricky <Chapter> & more".to_string(),
            content: markup.to_string(),
            url: url::Url::parse("https://example.com/tricky").unwrap(),
        };
        let sanitized = DefaultSanitizer::new()
            .title_heading(true)
            .sanitize(article)
            .unwrap();

        // Raw text and comments kept by the plain serializer must be XML-safe too.
        let mut raw = crate::sanitize::dom::parse_document(markup);
        let raw_body = raw.find_first_mut("body").unwrap().to_html();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tricky.epub");
        let mut book = Book::new("Tom & Jerry", "A <B>");
        book.add_chapter(sanitized.content, sanitized.title.as_str(), "tricky", None);
        book.add_chapter(raw_body, "Raw", "raw", None);
        book.add_chapter("<p>fragment &amp; more</p>", "Fragment", "fragment", None);
        let options = EpubOptions {
            ncx: true,
            toc_page: true,
        };
        book.write(&path, options).unwrap();

        let mut zip = open(&path);
        for name in [
            "OEBPS/tricky.xhtml",
            "OEBPS/raw.xhtml",
            "OEBPS/fragment.xhtml",
            "OEBPS/nav.xhtml",
            "OEBPS/toc.xhtml",
            "OEBPS/toc.ncx",
            "OEBPS/content.opf",
            "META-INF/container.xml",
        ] {
            let xml = read_entry(&mut zip, name);
            assert_well_formed(name, &xml);
        }
        let tricky = read_entry(&mut zip, "OEBPS/tricky.xhtml");
        assert!(!tricky.contains("<script"));
        assert!(!tricky.contains("<noscript"));
        assert!(!tricky.contains("<!--"));
        assert!(!tricky.contains("overlay"));
    }

    #[test]
    fn escapes_metadata() {
        let book = Book::new("Tom & Jerry's \"Tales\"", "A <B>");
        let opf = book.opf(EpubOptions::default());
        assert!(opf.contains("<dc:title>Tom &amp; Jerry&apos;s &quot;Tales&quot;</dc:title>"));
        assert!(opf.contains("<dc:creator>A &lt;B&gt;</dc:creator>"));
    }
}
