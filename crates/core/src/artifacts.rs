use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    fmt,
    str::FromStr,
    sync::OnceLock,
};

use regex::Regex;
use serde::Serialize;

/// Architectures packages are built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Arch {
    #[serde(rename = "osx-64")]
    Osx64,
    #[serde(rename = "linux-64")]
    Linux64,
    #[serde(rename = "noarch")]
    Noarch,
}

impl Arch {
    pub const fn variants() -> &'static [Self] { &[Self::Osx64, Self::Linux64, Self::Noarch] }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Osx64 => "osx-64",
            Self::Linux64 => "linux-64",
            Self::Noarch => "noarch",
        }
    }
}

impl FromStr for Arch {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "osx-64" => Ok(Self::Osx64),
            "linux-64" => Ok(Self::Linux64),
            "noarch" => Ok(Self::Noarch),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// A built package archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Package {
    pub arch: Arch,
    pub filename: String,
    pub url: String,
    /// Repository path the package was filed under, ending in `packages`.
    pub repo_path: String,
    /// URL of `<repo_path>/<arch>/repodata.json`, when the CI published one.
    pub repodata_url: Option<String>,
}

impl Package {
    /// Relative path the package is stored under when downloaded.
    pub fn local_path(&self) -> String { format!("{}/{}", self.arch, self.filename) }
}

/// A container image archive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Image {
    pub url: String,
    pub name: String,
    pub tag: String,
}

impl Image {
    pub fn local_path(&self) -> String { format!("{}__{}.tar.gz", self.name, self.tag) }

    pub fn reference(&self) -> String { format!("{}:{}", self.name, self.tag) }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    Package(Package),
    Image(Image),
}

fn package_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^(?P<repo>.*packages)/(?P<arch>osx-64|linux-64|noarch)/(?P<file>.+\.tar\.bz2)$")
            .unwrap()
    })
}

fn image_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^.*images/(?P<name>.+)(?::|%3A|%3a)(?P<tag>.+)\.tar\.gz$").unwrap()
    })
}

fn repodata_url(repo_path: &str, arch: Arch) -> String {
    format!("{repo_path}/{arch}/repodata.json")
}

/// Classify a single artifact URL. `known_urls` is the full URL set of the
/// batch the artifact came from and decides whether a repodata link exists.
pub fn classify(url: &str, known_urls: &HashSet<&str>) -> Option<Artifact> {
    if let Some(caps) = package_regex().captures(url) {
        let repo_path = caps.name("repo")?.as_str();
        let arch = caps.name("arch")?.as_str().parse::<Arch>().ok()?;
        let repodata = repodata_url(repo_path, arch);
        return Some(Artifact::Package(Package {
            arch,
            filename: caps.name("file")?.as_str().to_string(),
            url: url.to_string(),
            repo_path: repo_path.to_string(),
            repodata_url: known_urls.contains(repodata.as_str()).then_some(repodata),
        }));
    }
    let caps = image_regex().captures(url)?;
    Some(Artifact::Image(Image {
        url: url.to_string(),
        name: caps.name("name")?.as_str().to_string(),
        tag: caps.name("tag")?.as_str().to_string(),
    }))
}

/// Classified contents of one CI artifact listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ArtifactSet {
    pub packages: Vec<Package>,
    pub images: Vec<Image>,
    /// Repository paths with the architectures that have repodata published.
    pub repos: BTreeMap<String, BTreeSet<Arch>>,
}

impl ArtifactSet {
    /// Build the set from artifact URLs. The URL set is collected first so
    /// that repodata siblings are found regardless of listing order.
    pub fn from_urls<'a, I>(urls: I) -> Self
    where I: IntoIterator<Item = &'a str> {
        let urls = urls.into_iter().collect::<Vec<_>>();
        let known = urls.iter().copied().collect::<HashSet<_>>();
        let mut set = Self::default();
        for url in urls {
            match classify(url, &known) {
                Some(Artifact::Package(package)) => {
                    if package.repodata_url.is_some() {
                        set.repos.entry(package.repo_path.clone()).or_default().insert(package.arch);
                    }
                    set.packages.push(package);
                }
                Some(Artifact::Image(image)) => set.images.push(image),
                None => {}
            }
        }
        set
    }

    pub fn is_empty(&self) -> bool { self.packages.is_empty() && self.images.is_empty() }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://output.circle-artifacts.com/output/job/abc/artifacts/0/tmp/artifacts";

    fn classify_one(url: &str) -> Option<Artifact> { classify(url, &HashSet::new()) }

    #[test]
    fn test_classify_package() {
        for arch in Arch::variants() {
            let url = format!("{BASE}/packages/{arch}/samtools-1.17-h00cdaf9_0.tar.bz2");
            let Some(Artifact::Package(package)) = classify_one(&url) else {
                panic!("expected package for {url}");
            };
            assert_eq!(package.arch, *arch);
            assert_eq!(package.filename, "samtools-1.17-h00cdaf9_0.tar.bz2");
            assert_eq!(package.repo_path, format!("{BASE}/packages"));
            assert_eq!(package.repodata_url, None);
        }
    }

    #[test]
    fn test_classify_image() {
        for sep in [":", "%3A", "%3a"] {
            let url = format!("{BASE}/images/samtools{sep}1.17--h00cdaf9_0.tar.gz");
            let Some(Artifact::Image(image)) = classify_one(&url) else {
                panic!("expected image for {url}");
            };
            assert_eq!(image.name, "samtools");
            assert_eq!(image.tag, "1.17--h00cdaf9_0");
            assert_eq!(image.local_path(), "samtools__1.17--h00cdaf9_0.tar.gz");
        }
    }

    #[test]
    fn test_classify_unrecognized() {
        let cases = [
            format!("{BASE}/packages/win-64/samtools-1.17-0.tar.bz2"),
            format!("{BASE}/packages/linux-64/samtools-1.17-0.conda"),
            format!("{BASE}/packages/linux-64/repodata.json"),
            format!("{BASE}/packages/Linux-64/samtools-1.17-0.tar.bz2"),
            format!("{BASE}/images/samtools.tar.gz"),
            format!("{BASE}/build.log"),
        ];
        for url in &cases {
            assert_eq!(classify_one(url), None, "{url}");
        }
    }

    #[test]
    fn test_repodata_link() {
        let pkg_linux = format!("{BASE}/packages/linux-64/a-1.0-0.tar.bz2");
        let pkg_osx = format!("{BASE}/packages/osx-64/a-1.0-0.tar.bz2");
        let repodata_linux = format!("{BASE}/packages/linux-64/repodata.json");
        let urls = [pkg_linux.as_str(), pkg_osx.as_str(), repodata_linux.as_str()];
        let set = ArtifactSet::from_urls(urls);
        assert_eq!(set.packages.len(), 2);
        assert_eq!(set.packages[0].repodata_url.as_deref(), Some(repodata_linux.as_str()));
        assert_eq!(set.packages[1].repodata_url, None);
        let expected = BTreeMap::from([(format!("{BASE}/packages"), BTreeSet::from([Arch::Linux64]))]);
        assert_eq!(set.repos, expected);
    }

    #[test]
    fn test_order_independent() {
        let urls = vec![
            format!("{BASE}/packages/noarch/b-2.0-py_0.tar.bz2"),
            format!("{BASE}/packages/linux-64/a-1.0-0.tar.bz2"),
            format!("{BASE}/images/a%3A1.0--0.tar.gz"),
            format!("{BASE}/packages/noarch/repodata.json"),
            format!("{BASE}/packages/linux-64/repodata.json"),
            format!("{BASE}/other/readme.txt"),
        ];
        let forward = ArtifactSet::from_urls(urls.iter().map(String::as_str));
        let backward = ArtifactSet::from_urls(urls.iter().rev().map(String::as_str));
        assert_eq!(forward.repos, backward.repos);
        assert_eq!(forward.images, backward.images);
        let mut a = forward.packages.clone();
        let mut b = backward.packages.clone();
        a.sort_by(|x, y| x.url.cmp(&y.url));
        b.sort_by(|x, y| x.url.cmp(&y.url));
        assert_eq!(a, b);
        assert!(a.iter().all(|p| p.repodata_url.is_some()));
    }

    #[test]
    fn test_empty() {
        let set = ArtifactSet::from_urls([]);
        assert!(set.is_empty());
    }
}
