/// One page of an in-memory result list.
///
/// Pages are 1-based. A requested page past the end is clamped to the last
/// page, and page 0 is treated as page 1. An empty list has a single empty page.
#[derive(Debug, Clone)]
pub struct Page<'a, T> {
    pub items: &'a [T],
    pub number: usize,
    pub total_pages: usize,
    pub total_items: usize,
    pub page_size: usize,
}

impl<'a, T> Page<'a, T> {
    pub fn of(all: &'a [T], requested: usize, page_size: usize) -> Self {
        let page_size = page_size.max(1);
        let total_items = all.len();
        let total_pages = total_items.div_ceil(page_size).max(1);
        let number = requested.clamp(1, total_pages);

        let start = (number - 1) * page_size;
        let end = (start + page_size).min(total_items);
        let items = if start < total_items { &all[start..end] } else { &all[..0] };

        Self {
            items,
            number,
            total_pages,
            total_items,
            page_size,
        }
    }

    pub fn has_prev(&self) -> bool {
        self.number > 1
    }

    pub fn has_next(&self) -> bool {
        self.number < self.total_pages
    }

    /// 1-based position of the first item on this page, 0 when empty.
    pub fn first_index(&self) -> usize {
        if self.items.is_empty() {
            0
        } else {
            (self.number - 1) * self.page_size + 1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_past_the_end_is_clamped() {
        let records: Vec<u32> = (1..=65).collect();

        let page = Page::of(&records, 4, 30);
        assert_eq!(page.number, 3);
        assert_eq!(page.total_pages, 3);
        assert_eq!(page.items, &records[60..]);
        assert!(page.has_prev());
        assert!(!page.has_next());
        assert_eq!(page.first_index(), 61);
    }

    #[test]
    fn test_first_page_holds_leading_records() {
        let records: Vec<u32> = (0..65).collect();
        let page = Page::of(&records, 1, 30);
        assert_eq!(page.items, &records[..30]);
        assert!(!page.has_prev());
        assert!(page.has_next());
        assert_eq!(page.first_index(), 1);
    }

    #[test]
    fn test_middle_page() {
        let records: Vec<u32> = (1..=65).collect();
        let page = Page::of(&records, 2, 30);
        assert_eq!(page.items.len(), 30);
        assert_eq!(page.items[0], 31);
        assert!(page.has_prev());
        assert!(page.has_next());
    }

    #[test]
    fn test_page_zero_is_first_page() {
        let records = [1, 2, 3];
        let page = Page::of(&records, 0, 30);
        assert_eq!(page.number, 1);
        assert_eq!(page.items.len(), 3);
        assert!(!page.has_prev());
        assert!(!page.has_next());
    }

    #[test]
    fn test_empty_list_has_one_empty_page() {
        let records: [u8; 0] = [];
        let page = Page::of(&records, 5, 30);
        assert_eq!(page.number, 1);
        assert_eq!(page.total_pages, 1);
        assert!(page.items.is_empty());
        assert_eq!(page.first_index(), 0);
    }

    #[test]
    fn test_zero_page_size_is_guarded() {
        let records = [1, 2];
        let page = Page::of(&records, 2, 0);
        assert_eq!(page.page_size, 1);
        assert_eq!(page.items, &[2]);
    }
}
