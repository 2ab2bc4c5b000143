//! Catalog of the books the reader ships with.

/// A book of scripture, addressed by a short slug or its full title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Book {
    /// Short name used in navigation paths.
    pub short: &'static str,

    /// Full title, as stored in verse and theme records.
    pub name: &'static str,
}

/// The four gospels, in canonical order.
pub const BOOKS: [Book; 4] = [
    Book {
        short: "მათე",
        name: "მათეს სახარება",
    },
    Book {
        short: "მარკოზი",
        name: "მარკოზის სახარება",
    },
    Book {
        short: "ლუკა",
        name: "ლუკას სახარება",
    },
    Book {
        short: "იოანე",
        name: "იოანეს სახარება",
    },
];

impl Book {
    /// Look a book up by its short name.
    pub fn from_short(short: &str) -> Option<Book> {
        BOOKS.iter().copied().find(|b| b.short == short)
    }

    /// Look a book up by its full title.
    pub fn from_name(name: &str) -> Option<Book> {
        BOOKS.iter().copied().find(|b| b.name == name)
    }

    /// Resolve either a short name or a full title.
    pub fn resolve(name: &str) -> Option<Book> {
        let name = name.trim();
        Self::from_short(name).or_else(|| Self::from_name(name))
    }
}

impl std::fmt::Display for Book {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name)
    }
}
