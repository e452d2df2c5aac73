//! JavaScript evaluated in the target page during payload analysis
//!
//! Two scripts: one fires the lazy-loading mechanisms a real user would
//! trigger, the other harvests every referenceable URL from the settled
//! DOM.

/// Trigger lazy-loading: scroll the full document, synthesize hover and
/// focus on lazy-attributed elements, click buttons whose text suggests
/// they reveal content. Resolves once the triggers have settled.
pub const LAZY_TRIGGER_SCRIPT: &str = r#"
    (async () => {
        const sleep = (ms) => new Promise(r => setTimeout(r, ms));

        // Full-document scroll to the bottom in steps, then back to top.
        const step = window.innerHeight || 800;
        const bottom = Math.max(
            document.body.scrollHeight,
            document.documentElement.scrollHeight
        );
        for (let y = 0; y <= bottom; y += step) {
            window.scrollTo(0, y);
            await sleep(60);
        }
        window.scrollTo(0, 0);

        // Hover and focus events on lazy-attributed elements.
        document.querySelectorAll('[data-src], [data-lazy]').forEach(el => {
            el.dispatchEvent(new MouseEvent('mouseover', { bubbles: true }));
            el.dispatchEvent(new FocusEvent('focus', { bubbles: true }));
        });

        // Best-effort clicks on reveal buttons.
        const revealWords = ['load', 'show', 'more'];
        let clicks = 0;
        document.querySelectorAll('button, [role="button"]').forEach(btn => {
            const text = (btn.textContent || '').toLowerCase();
            if (clicks < 5 && revealWords.some(w => text.includes(w))) {
                try { btn.click(); clicks++; } catch (e) { /* detached */ }
            }
        });

        await sleep(400);
        return { scrolled: bottom, clicks };
    })()
"#;

/// Harvest every referenceable URL from the live DOM.
///
/// Returns raw values as written; resolution against the page URL happens
/// host-side. Inline CSS (style elements and style attributes) is returned
/// as text for host-side `url()`/`@import` extraction.
pub const HARVEST_SCRIPT: &str = r#"
    (() => {
        const stylesheets = Array.from(
            document.querySelectorAll('link[rel="stylesheet"]')
        ).filter(l => l.href).map(l => l.getAttribute('href'));

        const scripts = Array.from(document.querySelectorAll('script[src]'))
            .map(s => ({
                url: s.getAttribute('src'),
                defer: s.defer || false,
                async_load: s.async || false
            }));

        const images = [];
        document.querySelectorAll('img').forEach(img => {
            for (const attr of ['src', 'data-src', 'data-lazy-src', 'data-original']) {
                const v = img.getAttribute(attr);
                if (v) images.push(v);
            }
        });

        const srcsets = [];
        document.querySelectorAll('img[srcset], source[srcset]').forEach(el => {
            const v = el.getAttribute('srcset');
            if (v) srcsets.push(v);
        });

        const media = [];
        document.querySelectorAll('video, audio').forEach(el => {
            const v = el.getAttribute('src');
            if (v) media.push(v);
            el.querySelectorAll('source').forEach(s => {
                const sv = s.getAttribute('src');
                if (sv) media.push(sv);
            });
        });

        const icons = Array.from(document.querySelectorAll('link[rel~="icon"]'))
            .filter(l => l.href).map(l => l.getAttribute('href'));

        const manifests = Array.from(document.querySelectorAll('link[rel="manifest"]'))
            .filter(l => l.href).map(l => l.getAttribute('href'));

        const inline_css = [];
        document.querySelectorAll('style').forEach(s => {
            if (s.textContent) inline_css.push(s.textContent);
        });
        document.querySelectorAll('[style]').forEach(el => {
            const v = el.getAttribute('style');
            if (v && v.includes('url(')) inline_css.push(v);
        });

        // Computed background images surface CSS-applied assets without
        // walking every stylesheet rule.
        const bg_images = [];
        const seen = new Set();
        document.querySelectorAll('*').forEach(el => {
            const bg = getComputedStyle(el).backgroundImage;
            if (bg && bg !== 'none' && !seen.has(bg)) {
                seen.add(bg);
                bg_images.push(bg);
            }
        });

        return {
            stylesheets,
            scripts,
            images,
            srcsets,
            media,
            icons,
            manifests,
            inline_css,
            bg_images
        };
    })()
"#;
