//! Static data about PHP extensions.

/// Extensions bundled with the PHP sources, installed with
/// `docker-php-ext-install`. Everything else comes from PECL.
const CORE_EXTENSIONS: &[&str] = &[
  "bcmath",
  "bz2",
  "calendar",
  "ctype",
  "curl",
  "dba",
  "dom",
  "enchant",
  "exif",
  "ffi",
  "fileinfo",
  "filter",
  "ftp",
  "gd",
  "gd.freetype",
  "gd.jpeg",
  "gd.webp",
  "gettext",
  "gmp",
  "hash",
  "iconv",
  "imap",
  "intl",
  "json",
  "ldap",
  "mbstring",
  "mysqli",
  "oci8",
  "odbc",
  "opcache",
  "pcntl",
  "pdo",
  "pdo_dblib",
  "pdo_firebird",
  "pdo_mysql",
  "pdo_oci",
  "pdo_odbc",
  "pdo_pgsql",
  "pdo_sqlite",
  "pgsql",
  "phar",
  "posix",
  "pspell",
  "readline",
  "reflection",
  "session",
  "shmop",
  "simplexml",
  "snmp",
  "soap",
  "sockets",
  "sodium",
  "spl",
  "standard",
  "sysvmsg",
  "sysvsem",
  "sysvshm",
  "tidy",
  "tokenizer",
  "xml",
  "xmlreader",
  "xmlrpc",
  "xmlwriter",
  "xsl",
  "zip",
];

/// Extensions already compiled into the official PHP images.
const PREINSTALLED_EXTENSIONS: &[&str] = &["filter", "json", "reflection", "session", "spl", "standard"];

/// System packages needed to build each extension: (extension, debian, alpine).
const EXTENSION_DEPS: &[(&str, &[&str], &[&str])] = &[
  ("bz2", &["libbz2-dev"], &["bzip2-dev"]),
  ("curl", &["libcurl4-openssl-dev"], &["curl-dev"]),
  ("dom", &["libxml2-dev"], &["libxml2-dev"]),
  ("enchant", &["libenchant-dev"], &["enchant-dev"]),
  ("ffi", &["libffi-dev"], &["libffi-dev"]),
  ("ftp", &["libssl-dev"], &["openssl-dev"]),
  ("gd", &["libpng-dev"], &["libpng-dev", "zlib-dev"]),
  ("gd.freetype", &["libfreetype6-dev"], &["freetype-dev"]),
  ("gd.jpeg", &["libjpeg-dev"], &["libjpeg-turbo-dev"]),
  ("gd.webp", &["libwebp-dev"], &["libwebp-dev"]),
  ("gmp", &["libgmp-dev"], &["gmp-dev"]),
  ("imap", &["libc-client-dev", "libkrb5-dev"], &["imap-dev"]),
  ("intl", &["libicu-dev"], &["icu-dev"]),
  ("ldap", &["libldap2-dev"], &["openldap-dev"]),
  ("pdo_pgsql", &["libpq-dev"], &["postgresql-dev"]),
  ("pdo_sqlite", &["libsqlite3-dev"], &["sqlite-dev"]),
  ("pgsql", &["libpq-dev"], &["postgresql-dev"]),
  ("phar", &["libssl-dev"], &["openssl-dev"]),
  ("pspell", &["libpspell-dev"], &["aspell-dev"]),
  ("readline", &["libedit-dev"], &["libedit-dev"]),
  ("simplexml", &["libxml2-dev"], &["libxml2-dev"]),
  ("snmp", &["libsnmp-dev"], &["net-snmp-dev"]),
  ("soap", &["libxml2-dev"], &["libxml2-dev"]),
  ("sockets", &["libssl-dev", "openssl"], &["openssl-dev"]),
  ("sodium", &["libsodium-dev"], &["libsodium-dev"]),
  ("tidy", &["libtidy-dev"], &["tidyhtml-dev"]),
  ("xml", &["libxml2-dev"], &["libxml2-dev"]),
  ("xmlreader", &["libxml2-dev"], &["libxml2-dev"]),
  ("xmlrpc", &["libxml2-dev"], &["libxml2-dev"]),
  ("xmlwriter", &["libxml2-dev"], &["libxml2-dev"]),
  ("xsl", &["libxslt1-dev"], &["libxslt-dev"]),
  ("zip", &["libzip-dev", "zlib1g-dev"], &["libzip-dev"]),
  // PECL
  ("amqp", &["librabbitmq-dev"], &["rabbitmq-c-dev"]),
  ("couchbase", &[], &["libcouchbase-dev"]),
  ("imagick", &["libmagick++-6.q16-dev"], &["imagemagick6-dev"]),
  ("memcache", &["zlib1g-dev"], &["zlib-dev"]),
  ("memcached", &["libmemcached-dev", "zlib1g-dev"], &["libmemcached-dev", "zlib-dev"]),
  ("rdkafka", &["librdkafka-dev"], &["librdkafka-dev"]),
  ("zookeeper", &["libzookeeper-mt-dev"], &[]),
];

/// Extension directories of the official images, by `major.minor` version.
const EXTENSION_DIRS: &[(&str, &str)] = &[
  ("7.2", "/usr/local/lib/php/extensions/no-debug-non-zts-20170718"),
  ("7.3", "/usr/local/lib/php/extensions/no-debug-non-zts-20180731"),
  ("7.4", "/usr/local/lib/php/extensions/no-debug-non-zts-20190902"),
];

pub fn is_core_extension(name: &str) -> bool {
  CORE_EXTENSIONS.contains(&name)
}

pub fn is_preinstalled(name: &str) -> bool {
  PREINSTALLED_EXTENSIONS.contains(&name)
}

/// System packages required by an extension on the given OS family.
pub fn system_deps(extension: &str, os_family: &str) -> &'static [&'static str] {
  EXTENSION_DEPS
    .iter()
    .find(|(name, _, _)| *name == extension)
    .map(|(_, debian, alpine)| if os_family == "alpine" { *alpine } else { *debian })
    .unwrap_or(&[])
}

pub fn extension_dir(maj_min_version: &str) -> Option<&'static str> {
  EXTENSION_DIRS
    .iter()
    .find(|(version, _)| *version == maj_min_version)
    .map(|(_, dir)| *dir)
}
