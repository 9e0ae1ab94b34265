use core::fmt;

pub const DEFAULT_STROKE_WIDTH: f64 = 40.0;

#[derive(Debug, Clone, PartialEq)]
pub enum MapParseError {
    NotSvg,
    NoGeometry,
    InvalidNumber(String),
    InvalidPath(String),
}

impl fmt::Display for MapParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapParseError::NotSvg => write!(f, "text is not an SVG document"),
            MapParseError::NoGeometry => write!(f, "SVG has no lines or paths"),
            MapParseError::InvalidNumber(value) => write!(f, "invalid number '{}'", value),
            MapParseError::InvalidPath(reason) => write!(f, "invalid path data: {}", reason),
        }
    }
}

impl std::error::Error for MapParseError {}

/// A stroked straight piece of walkable path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub ax: f64,
    pub ay: f64,
    pub bx: f64,
    pub by: f64,
    pub half_width: f64,
}

impl Segment {
    pub fn distance_to(&self, x: f64, y: f64) -> f64 {
        let (vx, vy) = (self.bx - self.ax, self.by - self.ay);
        let length_sq = vx * vx + vy * vy;

        if length_sq == 0.0 {
            return (x - self.ax).hypot(y - self.ay);
        }

        let t = (((x - self.ax) * vx + (y - self.ay) * vy) / length_sq).clamp(0.0, 1.0);

        (x - (self.ax + t * vx)).hypot(y - (self.ay + t * vy))
    }
}

/// Walkable area of a board, built from the strokes of an SVG map.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkableMap {
    segments: Vec<Segment>,
    view_size: Option<(f64, f64)>,
}

impl WalkableMap {
    /// Reads `<line>`, `<polyline>`, `<polygon>` and `<path>` elements.
    /// Curves are walked along their chords.
    pub fn parse(text: &str) -> Result<Self, MapParseError> {
        if !text.contains("<svg") {
            return Err(MapParseError::NotSvg);
        }

        let mut segments = Vec::new();
        let mut view_size = None;

        for (name, attrs) in elements(text) {
            let half_width = stroke_width(attrs)? / 2.0;

            match name {
                "svg" => view_size = svg_size(attrs)?,
                "line" => {
                    let coord = |key: &str| number_attr(attrs, key).map(|value| value.unwrap_or(0.0));

                    segments.push(Segment {
                        ax: coord("x1")?,
                        ay: coord("y1")?,
                        bx: coord("x2")?,
                        by: coord("y2")?,
                        half_width,
                    });
                }
                "polyline" | "polygon" => {
                    let points = pairs(&numbers(attr(attrs, "points").unwrap_or(""))?);
                    let mut corners = points.clone();

                    if name == "polygon" {
                        corners.extend(points.first().copied());
                    }

                    segments.extend(corners.windows(2).map(|pair| Segment {
                        ax: pair[0].0,
                        ay: pair[0].1,
                        bx: pair[1].0,
                        by: pair[1].1,
                        half_width,
                    }));
                }
                "path" => {
                    let d = attr(attrs, "d").unwrap_or("");
                    segments.extend(path_segments(d, half_width)?);
                }
                _ => {}
            }
        }

        if segments.is_empty() {
            return Err(MapParseError::NoGeometry);
        }

        Ok(Self {
            segments,
            view_size,
        })
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Width and height declared by the root element, if any.
    pub fn view_size(&self) -> Option<(f64, f64)> {
        self.view_size
    }

    pub fn is_on_path(&self, x: f64, y: f64) -> bool {
        self.segments
            .iter()
            .any(|segment| segment.distance_to(x, y) <= segment.half_width)
    }
}

fn elements(text: &str) -> impl Iterator<Item = (&str, &str)> {
    text.split('<').skip(1).filter_map(|chunk| {
        let body = chunk[..chunk.find('>')?].trim_end_matches('/');
        let name_end = body.find(char::is_whitespace).unwrap_or(body.len());

        Some((&body[..name_end], &body[name_end..]))
    })
}

fn attr<'a>(attrs: &'a str, name: &str) -> Option<&'a str> {
    let mut offset = 0;

    while let Some(found) = attrs[offset..].find(name) {
        let start = offset + found;
        offset = start + name.len();

        if !attrs[..start].ends_with(char::is_whitespace) {
            continue;
        }

        let Some(value) = attrs[offset..].trim_start().strip_prefix('=') else {
            continue;
        };
        let value = value.trim_start();
        let quote = value.chars().next()?;

        if quote != '"' && quote != '\'' {
            continue;
        }

        let inner = &value[1..];

        return Some(&inner[..inner.find(quote)?]);
    }

    None
}

fn parse_number(value: &str) -> Result<f64, MapParseError> {
    let trimmed = value.trim().trim_end_matches("px");

    trimmed
        .parse::<f64>()
        .ok()
        .filter(|number| number.is_finite())
        .ok_or_else(|| MapParseError::InvalidNumber(value.to_string()))
}

fn number_attr(attrs: &str, name: &str) -> Result<Option<f64>, MapParseError> {
    attr(attrs, name).map(parse_number).transpose()
}

fn stroke_width(attrs: &str) -> Result<f64, MapParseError> {
    if let Some(width) = number_attr(attrs, "stroke-width")? {
        return Ok(width);
    }

    let from_style = attr(attrs, "style").and_then(|style| {
        style.split(';').find_map(|rule| {
            let (key, value) = rule.split_once(':')?;
            (key.trim() == "stroke-width").then_some(value)
        })
    });

    match from_style {
        Some(value) => parse_number(value),
        None => Ok(DEFAULT_STROKE_WIDTH),
    }
}

fn svg_size(attrs: &str) -> Result<Option<(f64, f64)>, MapParseError> {
    if let Some(view_box) = attr(attrs, "viewBox") {
        if let [_, _, width, height] = numbers(view_box)?[..] {
            return Ok(Some((width, height)));
        }
    }

    match (number_attr(attrs, "width")?, number_attr(attrs, "height")?) {
        (Some(width), Some(height)) => Ok(Some((width, height))),
        _ => Ok(None),
    }
}

fn numbers(list: &str) -> Result<Vec<f64>, MapParseError> {
    list.split(|c: char| c.is_whitespace() || c == ',')
        .filter(|item| !item.is_empty())
        .map(parse_number)
        .collect()
}

fn pairs(values: &[f64]) -> Vec<(f64, f64)> {
    values.chunks_exact(2).map(|pair| (pair[0], pair[1])).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PathToken {
    Command(char),
    Number(f64),
}

fn tokenize(d: &str) -> Result<Vec<PathToken>, MapParseError> {
    let chars: Vec<char> = d.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() || c == ',' {
            i += 1;
        } else if c.is_ascii_alphabetic() {
            tokens.push(PathToken::Command(c));
            i += 1;
        } else if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') {
            let start = i;
            let mut seen_dot = false;
            i += 1;

            if c == '.' {
                seen_dot = true;
            }

            while i < chars.len() {
                match chars[i] {
                    digit if digit.is_ascii_digit() => i += 1,
                    '.' if !seen_dot => {
                        seen_dot = true;
                        i += 1;
                    }
                    'e' | 'E' => {
                        i += 1;

                        if i < chars.len() && matches!(chars[i], '-' | '+') {
                            i += 1;
                        }
                    }
                    _ => break,
                }
            }

            let text: String = chars[start..i].iter().collect();
            tokens.push(PathToken::Number(parse_number(&text)?));
        } else {
            return Err(MapParseError::InvalidPath(format!("unexpected '{}'", c)));
        }
    }

    Ok(tokens)
}

fn path_segments(d: &str, half_width: f64) -> Result<Vec<Segment>, MapParseError> {
    let tokens = tokenize(d)?;
    let mut segments = Vec::new();
    let mut current = (0.0, 0.0);
    let mut subpath_start = (0.0, 0.0);
    let mut command: Option<char> = None;
    let mut i = 0;

    let mut line_to = |from: (f64, f64), to: (f64, f64)| {
        segments.push(Segment {
            ax: from.0,
            ay: from.1,
            bx: to.0,
            by: to.1,
            half_width,
        });
    };

    while i < tokens.len() {
        if let PathToken::Command(c) = tokens[i] {
            i += 1;

            if c.eq_ignore_ascii_case(&'z') {
                line_to(current, subpath_start);
                current = subpath_start;
                command = None;
            } else {
                command = Some(c);
            }

            continue;
        }

        let c = command.ok_or_else(|| MapParseError::InvalidPath("number before command".into()))?;

        let arity = match c.to_ascii_uppercase() {
            'M' | 'L' | 'T' => 2,
            'H' | 'V' => 1,
            'S' | 'Q' => 4,
            'C' => 6,
            'A' => 7,
            other => return Err(MapParseError::InvalidPath(format!("unknown command '{}'", other))),
        };

        let mut args = Vec::with_capacity(arity);

        while args.len() < arity {
            match tokens.get(i) {
                Some(PathToken::Number(value)) => args.push(*value),
                _ => return Err(MapParseError::InvalidPath(format!("'{}' is missing arguments", c))),
            }

            i += 1;
        }

        let (base_x, base_y) = if c.is_ascii_lowercase() { current } else { (0.0, 0.0) };
        let end = |x: f64, y: f64| (base_x + x, base_y + y);

        let target = match c.to_ascii_uppercase() {
            'H' => (end(args[0], 0.0).0, current.1),
            'V' => (current.0, end(0.0, args[0]).1),
            _ => end(args[arity - 2], args[arity - 1]),
        };

        if c.eq_ignore_ascii_case(&'m') {
            subpath_start = target;
            // Further coordinate pairs after a moveto are linetos.
            command = Some(if c == 'm' { 'l' } else { 'L' });
        } else {
            line_to(current, target);
        }

        current = target;
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CROSS: &str = r#"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 400 300">
        <line x1="0" y1="150" x2="400" y2="150" stroke-width="20"/>
        <path d="M 200 0 V 300" stroke="black"/>
    </svg>"#;

    #[test]
    fn lines_and_paths_become_segments() {
        let map = WalkableMap::parse(CROSS).unwrap();

        assert_eq!(map.segments().len(), 2);
        assert_eq!(map.view_size(), Some((400.0, 300.0)));
        assert_eq!(map.segments()[0].half_width, 10.0);
        assert_eq!(map.segments()[1].half_width, DEFAULT_STROKE_WIDTH / 2.0);
    }

    #[test]
    fn on_path_respects_stroke_width() {
        let map = WalkableMap::parse(CROSS).unwrap();

        assert!(map.is_on_path(50.0, 159.0));
        assert!(!map.is_on_path(50.0, 161.0));
        assert!(map.is_on_path(219.0, 20.0));
        assert!(!map.is_on_path(100.0, 50.0));
    }

    #[test]
    fn relative_commands_and_implicit_linetos() {
        let map = WalkableMap::parse(
            r#"<svg><path d="m10,10 20,0 h10 v-5.5 l-1e1-0z" stroke-width="2"/></svg>"#,
        )
        .unwrap();

        let ends: Vec<(f64, f64)> = map.segments().iter().map(|s| (s.bx, s.by)).collect();

        assert_eq!(ends, vec![(30.0, 10.0), (40.0, 10.0), (40.0, 4.5), (30.0, 4.5), (10.0, 10.0)]);
    }

    #[test]
    fn attribute_names_match_whole_words() {
        let map = WalkableMap::parse(
            r#"<svg><line data-x1="999" x1="1" y1="2" x2="3" y2="4" style="stroke-width: 8"/></svg>"#,
        )
        .unwrap();

        assert_eq!(map.segments()[0].ax, 1.0);
        assert_eq!(map.segments()[0].half_width, 4.0);
    }

    #[test]
    fn rejects_documents_without_geometry() {
        assert_eq!(WalkableMap::parse("hello"), Err(MapParseError::NotSvg));
        assert_eq!(
            WalkableMap::parse("<svg><rect width='5'/></svg>"),
            Err(MapParseError::NoGeometry)
        );
        assert!(matches!(
            WalkableMap::parse(r#"<svg><line x1="abc"/></svg>"#),
            Err(MapParseError::InvalidNumber(_))
        ));
    }

    #[test]
    fn polygons_close_back_to_the_first_point() {
        let map = WalkableMap::parse(r#"<svg><polygon points="0,0 10,0 10,10"/></svg>"#).unwrap();

        assert_eq!(map.segments().len(), 3);
        assert_eq!((map.segments()[2].bx, map.segments()[2].by), (0.0, 0.0));
    }
}
